use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::IngestError;

/// Tag carrying the model's private reasoning summary.
pub const PERSONAL_REASONING: &str = "PERSONAL_REASONING";
/// Tag listing the documents (and pages) an answer relied on.
pub const DOCUMENTS_REFERENCED: &str = "DOCUMENTS_REFERENCED";

/// A backend-internal annotation that is never shown to users.
///
/// Matches `[NAME]` and `[NAME: body]` for the name or any alias, ignoring
/// case. The body may hold one level of nested brackets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InternalTag {
    pub name: String,
    pub aliases: Vec<String>,
}

impl InternalTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

fn builtin_tags() -> Vec<InternalTag> {
    vec![
        InternalTag::new(PERSONAL_REASONING)
            .alias("PERSONAL REASONING")
            .alias("PERSONAL_REASONINNG")
            .alias("PERSONAL_REASONNING"),
        InternalTag::new(DOCUMENTS_REFERENCED)
            .alias("DOCUMENT_REFERENCED")
            .alias("DOCUMENTS REFERENCED")
            .alias("DOCS_REFERENCED"),
        InternalTag::new("INTERNAL_NOTE"),
        InternalTag::new("DEBUG"),
    ]
}

static BUILTIN: Lazy<TagTable> = Lazy::new(|| {
    TagTable::new(builtin_tags()).expect("built-in tag table must compile")
});

/// Compiled set of internal tags, stripped in a single pass.
#[derive(Clone, Debug)]
pub struct TagTable {
    tags: Vec<InternalTag>,
    canonical: HashMap<String, String>,
    pattern: Regex,
}

fn is_spacing(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

impl TagTable {
    /// Compiles a table. Fails if no tag has a usable name.
    pub fn new(tags: Vec<InternalTag>) -> Result<Self, IngestError> {
        let mut canonical = HashMap::new();
        let mut alternatives = Vec::new();
        for tag in &tags {
            for spelling in std::iter::once(&tag.name).chain(tag.aliases.iter()) {
                let spelling = spelling.trim();
                if spelling.is_empty() {
                    continue;
                }
                canonical.insert(spelling.to_lowercase(), tag.name.clone());
                alternatives.push(regex::escape(spelling));
            }
        }
        if alternatives.is_empty() {
            return Err(IngestError::Validation(
                "tag table needs at least one tag name".into(),
            ));
        }
        // Longest first so an alias never loses to its own prefix.
        alternatives.sort_by_key(|a| std::cmp::Reverse(a.len()));
        let pattern = format!(
            r"(?i)\[\s*(?P<name>{})\s*(?::(?P<body>(?:[^\[\]]|\[[^\[\]]*\])*))?\]",
            alternatives.join("|")
        );
        let pattern = Regex::new(&pattern)
            .map_err(|e| IngestError::Validation(format!("invalid tag table: {e}")))?;
        Ok(Self {
            tags,
            canonical,
            pattern,
        })
    }

    /// The table used by [`render_message`](crate::render_message).
    pub fn builtin() -> &'static TagTable {
        &BUILTIN
    }

    /// Returns a table with one more tag.
    pub fn with_tag(&self, tag: InternalTag) -> Result<Self, IngestError> {
        let mut tags = self.tags.clone();
        tags.push(tag);
        Self::new(tags)
    }

    pub fn tags(&self) -> &[InternalTag] {
        &self.tags
    }

    /// Removes every tag occurrence, including bodies.
    ///
    /// Text outside removed tags is kept verbatim. A tag standing on its own
    /// line takes that line with it; the blank lines around it collapse to at
    /// most one paragraph break, or to nothing at either end of the text.
    pub fn strip(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for m in self.pattern.find_iter(text) {
            out.push_str(&text[last..m.start()]);
            last = m.end();

            let after = &text[m.end()..];
            let right_len = after.len() - after.trim_start_matches(is_spacing).len();
            let right = &after[..right_len];
            let kept = out.trim_end_matches(is_spacing).len();
            let left = &out[kept..];

            let at_start = kept == 0;
            let at_end = right_len == after.len();
            let own_line =
                (at_start || left.contains('\n')) && (at_end || right.contains('\n'));
            if !own_line {
                if out.is_empty() || out.ends_with('\n') {
                    last += after.len() - after.trim_start_matches([' ', '\t']).len();
                }
                continue;
            }

            let breaks = left
                .matches('\n')
                .count()
                .max(right.matches('\n').count())
                .min(2);
            out.truncate(kept);
            if at_end {
                last += right_len;
            } else {
                // Keep the indentation of the next line.
                last += right.rfind('\n').map_or(right_len, |i| i + 1);
                if !at_start {
                    out.push_str(&"\n".repeat(breaks));
                }
            }
        }
        out.push_str(&text[last..]);
        out
    }

    /// Bodies of every occurrence of the tag named `name` (or its aliases).
    pub fn bodies(&self, text: &str, name: &str) -> Vec<String> {
        self.pattern
            .captures_iter(text)
            .filter(|caps| {
                caps.name("name")
                    .and_then(|m| self.canonical.get(&m.as_str().trim().to_lowercase()))
                    .is_some_and(|canonical| canonical.eq_ignore_ascii_case(name))
            })
            .filter_map(|caps| caps.name("body").map(|m| m.as_str().trim().to_string()))
            .collect()
    }
}
