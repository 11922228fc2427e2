use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Header variants that open the follow-up questions section.
pub const SUGGESTION_MARKERS: &[&str] = &[
    "Dive Deeper",
    "Suggested Inquiries",
    "Suggested Questions",
    "Follow-up Questions",
    "Follow up Questions",
    "Further Questions",
];

pub const MAX_SUGGESTIONS: usize = 5;
pub const MIN_SUGGESTION_CHARS: usize = 10;
pub const MAX_SUGGESTION_CHARS: usize = 200;

static MARKER: Lazy<Regex> = Lazy::new(|| {
    let names = SUGGESTION_MARKERS
        .iter()
        .map(|m| regex::escape(m))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        r"(?im)^[ \t>#*_]*(?:💡[ \t]*)?(?:{names})[ \t]*[:*_]*[ \t\r]*$"
    ))
    .expect("suggestion marker regex")
});

static QUESTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*(?:\d+[.)]|[-*•])[ \t]*\**[ \t]*["“](?P<q>[^"”\n]+)["”]"#)
        .expect("suggestion item regex")
});

/// Splits off the follow-up questions section.
///
/// Returns the text before the marker line (trimmed) and the quoted questions
/// listed after it. Without a marker the text is returned unchanged.
pub fn extract_suggestions(text: &str) -> (String, Vec<String>) {
    let Some(marker) = MARKER.find(text) else {
        return (text.to_string(), Vec::new());
    };
    let display = text[..marker.start()].trim_end().to_string();
    let tail = &text[marker.end()..];

    let mut seen = HashSet::new();
    let mut questions = Vec::new();
    for caps in QUESTION.captures_iter(tail) {
        let Some(q) = caps.name("q") else { continue };
        let question = q.as_str().trim();
        let len = question.chars().count();
        if !(MIN_SUGGESTION_CHARS..=MAX_SUGGESTION_CHARS).contains(&len) {
            continue;
        }
        if !seen.insert(question.to_lowercase()) {
            continue;
        }
        questions.push(question.to_string());
        if questions.len() == MAX_SUGGESTIONS {
            break;
        }
    }
    (display, questions)
}
