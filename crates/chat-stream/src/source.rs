use std::collections::HashSet;

/// A grounding document attached to an answer.
///
/// Wire field names are snake_case (`source_type`, `material_id`); the
/// camelCase spellings are accepted too. Unknown fields are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Source {
    pub title: String,
    /// Presentation label; overrides `title` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, alias = "sourceType", skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    /// Opaque key for the follow-up "deep analyze" action.
    #[serde(default, alias = "materialId", skip_serializing_if = "Option::is_none")]
    pub material_id: Option<String>,
    /// Page the answer cites in this document, when the backend knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl Source {
    /// Creates a source with only a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Sets the link.
    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Sets the material id.
    pub fn material_id(mut self, material_id: impl Into<String>) -> Self {
        self.material_id = Some(material_id.into());
        self
    }

    /// Sets the cited page.
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Text to show for this source.
    pub fn label(&self) -> &str {
        self.display
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(&self.title)
    }
}

/// Drops later sources whose title matches an earlier one, ignoring case.
pub fn dedup_by_title(sources: &[Source]) -> Vec<Source> {
    let mut seen = HashSet::new();
    sources
        .iter()
        .filter(|s| seen.insert(s.title.trim().to_lowercase()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_shape_with_nulls_and_extra_fields() {
        let raw = r#"{"title":"Syllabus [CS101]","display":"📚 Syllabus [CS101]","link":null,
            "snippet":"Week 1","source_type":"course_material","material_id":"m-9","score":0.7}"#;
        let source: Source = serde_json::from_str(raw).expect("parse");
        assert_eq!(source.title, "Syllabus [CS101]");
        assert_eq!(source.link, None);
        assert_eq!(source.source_type.as_deref(), Some("course_material"));
        assert_eq!(source.material_id.as_deref(), Some("m-9"));
        assert_eq!(source.label(), "📚 Syllabus [CS101]");
    }

    #[test]
    fn accepts_camel_case_aliases() {
        let source: Source =
            serde_json::from_str(r#"{"title":"A","sourceType":"email","materialId":"x"}"#)
                .expect("parse");
        assert_eq!(source.source_type.as_deref(), Some("email"));
        assert_eq!(source.material_id.as_deref(), Some("x"));
    }

    #[test]
    fn label_falls_back_to_title() {
        let mut source = Source::new("Notes");
        assert_eq!(source.label(), "Notes");
        source.display = Some("  ".into());
        assert_eq!(source.label(), "Notes");
    }

    #[test]
    fn dedup_is_case_insensitive_and_keeps_first() {
        let sources = vec![
            Source::new("Lecture 1").link("a"),
            Source::new("lecture 1").link("b"),
            Source::new("Lecture 2"),
        ];
        let deduped = dedup_by_title(&sources);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].link.as_deref(), Some("a"));
        assert_eq!(deduped[1].title, "Lecture 2");
    }
}
