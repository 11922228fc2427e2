use crate::source::Source;

/// Typed events reconstructed from the chat stream, in arrival order.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The backend assigned (or confirmed) the conversation thread.
    ThreadAssigned { thread_id: String },
    /// Human-readable progress label; each one replaces the previous.
    ProgressStep { label: String },
    /// Full source list for the answer; replaces any earlier list.
    SourcesFound { sources: Vec<Source> },
    /// Fragment of assistant text to append.
    TokenDelta { text: String },
    /// No further events follow for this request.
    StreamEnded,
}

impl StreamEvent {
    /// Returns true for `StreamEnded`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StreamEnded)
    }

    /// Convenience accessor for `TokenDelta` text.
    pub fn as_text_delta(&self) -> Option<&str> {
        match self {
            Self::TokenDelta { text } => Some(text),
            _ => None,
        }
    }
}
