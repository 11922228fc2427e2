use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::tags::{DOCUMENTS_REFERENCED, TagTable};
use crate::source::Source;

static CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("citation regex"));

static FOOTNOTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^[ \t]*\[(?P<index>\d+)\][ \t]*(?P<title>.+?)[ \t]*\[[ \t]*Pages?[ \t]*(?P<page>\d+)")
        .expect("footnote regex")
});

static REFERENCED_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?P<title>[^()]+?)\s*\(\s*(?:Pages?\s*)?(?P<page>\d+)[^)]*\)")
        .expect("referenced entry regex")
});

/// An inline `[n]` marker. `index` is 1-based and may be out of range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CitationRef {
    pub index: usize,
}

impl CitationRef {
    pub fn new(index: usize) -> Self {
        Self { index }
    }

    /// The source at this ordinal position, if any.
    pub fn source<'a>(&self, sources: &'a [Source]) -> Option<&'a Source> {
        self.index.checked_sub(1).and_then(|i| sources.get(i))
    }
}

/// Piece of display text: verbatim markdown or a citation marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Citation(CitationRef),
}

/// Splits text on `[n]` markers, keeping the text between them verbatim.
pub fn segment_citations(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;
    for caps in CITATION.captures_iter(text) {
        let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        // Too many digits for usize: leave it as text.
        let Ok(index) = digits.as_str().parse::<usize>() else {
            continue;
        };
        if whole.start() > last {
            segments.push(Segment::Text(text[last..whole.start()].to_string()));
        }
        segments.push(Segment::Citation(CitationRef::new(index)));
        last = whole.end();
    }
    if last < text.len() {
        segments.push(Segment::Text(text[last..].to_string()));
    }
    segments
}

/// Every citation marker in order of appearance.
pub fn extract_citations(text: &str) -> Vec<CitationRef> {
    segment_citations(text)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Citation(citation) => Some(citation),
            Segment::Text(_) => None,
        })
        .collect()
}

/// A page named in free text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRef {
    pub title: String,
    pub page: u32,
}

/// Page hints recovered from the answer body.
///
/// Footnotes (`[1] Title [Page 5]`) map an index to a page. The
/// referenced-documents tag maps a title to a page. Both are best effort and
/// lose to a page carried by the structured source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageAnnotations {
    by_index: BTreeMap<usize, PageRef>,
    by_title: Vec<PageRef>,
}

impl PageAnnotations {
    /// Parses annotations from raw (unstripped) content.
    pub fn parse(content: &str, tags: &TagTable) -> Self {
        let mut annotations = Self::default();
        for caps in FOOTNOTE.captures_iter(content) {
            let (Ok(index), Ok(page)) = (
                caps["index"].parse::<usize>(),
                caps["page"].parse::<u32>(),
            ) else {
                continue;
            };
            annotations.by_index.entry(index).or_insert(PageRef {
                title: caps["title"].trim().to_string(),
                page,
            });
        }
        for body in tags.bodies(content, DOCUMENTS_REFERENCED) {
            for caps in REFERENCED_ENTRY.captures_iter(&body) {
                let Ok(page) = caps["page"].parse::<u32>() else {
                    continue;
                };
                let title = caps["title"]
                    .trim_matches(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .to_string();
                if !title.is_empty() {
                    annotations.by_title.push(PageRef { title, page });
                }
            }
        }
        annotations
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty() && self.by_title.is_empty()
    }

    /// Footnote page for a citation index.
    pub fn for_index(&self, index: usize) -> Option<&PageRef> {
        self.by_index.get(&index)
    }

    /// Referenced-documents page for a title, ignoring case.
    pub fn for_title(&self, title: &str) -> Option<&PageRef> {
        let title = title.trim();
        self.by_title
            .iter()
            .find(|r| r.title.eq_ignore_ascii_case(title))
    }
}

/// What activating a citation should do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CitationTarget<'a> {
    /// Jump to a page of a document.
    Page {
        title: String,
        page: u32,
        material_id: Option<String>,
    },
    /// Show the source entry.
    Source(&'a Source),
    /// Out of range: render the marker but do nothing.
    Inert,
}

impl CitationTarget<'_> {
    pub fn is_inert(&self) -> bool {
        matches!(self, Self::Inert)
    }
}

/// Resolves a marker against the message's sources and page hints.
///
/// Precedence: structured source page, footnote page, referenced-documents
/// page matched by source title, the bare source, then inert.
pub fn resolve_citation<'a>(
    citation: CitationRef,
    sources: &'a [Source],
    annotations: &PageAnnotations,
) -> CitationTarget<'a> {
    let source = citation.source(sources);
    let material_id = source.and_then(|s| s.material_id.clone());

    if let Some(source) = source
        && let Some(page) = source.page
    {
        return CitationTarget::Page {
            title: source.title.clone(),
            page,
            material_id,
        };
    }
    if let Some(footnote) = annotations.for_index(citation.index) {
        return CitationTarget::Page {
            title: footnote.title.clone(),
            page: footnote.page,
            material_id,
        };
    }
    match source {
        Some(source) => match annotations.for_title(&source.title) {
            Some(referenced) => CitationTarget::Page {
                title: source.title.clone(),
                page: referenced.page,
                material_id,
            },
            None => CitationTarget::Source(source),
        },
        None => CitationTarget::Inert,
    }
}
