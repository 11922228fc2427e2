//! Post-processing of finalized assistant text.
//!
//! Runs on the finished `content`, never while streaming:
//! 1. page hints are read from footnotes and the referenced-documents tag,
//! 2. internal tags are stripped,
//! 3. the follow-up questions section is split off,
//! 4. the remaining text is segmented around `[n]` citation markers.
mod citations;
mod suggestions;
mod tags;

pub use citations::{
    CitationRef, CitationTarget, PageAnnotations, PageRef, Segment, extract_citations,
    resolve_citation, segment_citations,
};
pub use suggestions::{
    MAX_SUGGESTION_CHARS, MAX_SUGGESTIONS, MIN_SUGGESTION_CHARS, SUGGESTION_MARKERS,
    extract_suggestions,
};
pub use tags::{DOCUMENTS_REFERENCED, InternalTag, PERSONAL_REASONING, TagTable};

use crate::source::Source;

/// Display-ready form of an assistant message.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedMessage {
    /// Text after tag stripping and suggestion truncation.
    pub display_text: String,
    pub segments: Vec<Segment>,
    /// Clickable follow-up questions.
    pub suggestions: Vec<String>,
    pub annotations: PageAnnotations,
    pub sources: Vec<Source>,
}

impl RenderedMessage {
    /// Citation markers in display order.
    pub fn citations(&self) -> impl Iterator<Item = CitationRef> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Citation(citation) => Some(*citation),
            Segment::Text(_) => None,
        })
    }

    /// Resolves a marker from this message.
    pub fn resolve(&self, citation: CitationRef) -> CitationTarget<'_> {
        resolve_citation(citation, &self.sources, &self.annotations)
    }
}

/// Removes built-in internal tags from `text`.
pub fn strip_internal_tags(text: &str) -> String {
    TagTable::builtin().strip(text)
}

/// Renders content with the built-in tag table.
pub fn render_message(content: &str, sources: &[Source]) -> RenderedMessage {
    render_with_tags(content, sources, TagTable::builtin())
}

/// Renders content with a caller-supplied tag table.
pub fn render_with_tags(content: &str, sources: &[Source], tags: &TagTable) -> RenderedMessage {
    let annotations = PageAnnotations::parse(content, tags);
    let stripped = tags.strip(content);
    let (display_text, suggestions) = extract_suggestions(&stripped);
    let segments = segment_citations(&display_text);
    RenderedMessage {
        display_text,
        segments,
        suggestions,
        annotations,
        sources: sources.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_pipeline_strips_truncates_and_segments() {
        let content = "[PERSONAL_REASONING: visual learner]\nEntropy always rises [1], see the lab [2].\n\n💡 Dive Deeper:\n1. \"Why is entropy extensive?\"\n\n[DOCUMENTS_REFERENCED: Thermo Notes (Page 3)]";
        let sources = vec![Source::new("Thermo Notes"), Source::new("Lab Guide")];
        let rendered = render_message(content, &sources);

        assert_eq!(
            rendered.display_text,
            "Entropy always rises [1], see the lab [2]."
        );
        assert_eq!(rendered.suggestions, vec!["Why is entropy extensive?"]);
        assert_eq!(
            rendered.citations().collect::<Vec<_>>(),
            vec![CitationRef::new(1), CitationRef::new(2)]
        );
        assert_eq!(
            rendered.resolve(CitationRef::new(1)),
            CitationTarget::Page {
                title: "Thermo Notes".into(),
                page: 3,
                material_id: None,
            }
        );
        assert_eq!(
            rendered.resolve(CitationRef::new(2)),
            CitationTarget::Source(&sources[1])
        );
    }

    #[test]
    fn strip_internal_tags_uses_builtin_table() {
        assert_eq!(
            strip_internal_tags("[DEBUG: route=rag]Hello [1]"),
            "Hello [1]"
        );
    }

    #[test]
    fn out_of_range_marker_renders_and_resolves_inertly() {
        let sources = vec![Source::new("Only source")];
        let rendered = render_message("[99]", &sources);
        assert_eq!(
            rendered.segments,
            vec![Segment::Citation(CitationRef::new(99))]
        );
        assert!(rendered.resolve(CitationRef::new(99)).is_inert());
    }
}
