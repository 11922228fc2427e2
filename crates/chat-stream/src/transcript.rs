use tracing::debug;

use crate::event::StreamEvent;
use crate::message::{ChatMessage, StreamOutput};
use crate::render::extract_citations;

/// Ordered messages of one conversation thread.
///
/// Updates are keyed by message id, so several requests may stream into the
/// same transcript at once.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Transcript {
    pub thread_id: Option<String>,
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes an existing thread.
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn message(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Appends a user message and returns its id.
    pub fn push_user(&mut self, content: impl Into<String>) -> String {
        self.push(ChatMessage::user(content))
    }

    /// Appends an empty pending assistant message and returns its id.
    pub fn begin_assistant(&mut self) -> String {
        self.push(ChatMessage::pending_assistant())
    }

    /// Appends an arbitrary message and returns its id.
    pub fn push(&mut self, message: ChatMessage) -> String {
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    /// Applies one event to the message with `id`.
    ///
    /// Returns false when no such message exists.
    pub fn apply(&mut self, id: &str, event: &StreamEvent) -> bool {
        if let StreamEvent::ThreadAssigned { thread_id } = event {
            self.thread_id = Some(thread_id.clone());
        }
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            debug!(message_id = id, "event for unknown message ignored");
            return false;
        };
        match event {
            StreamEvent::ThreadAssigned { .. } | StreamEvent::ProgressStep { .. } => {}
            StreamEvent::SourcesFound { sources } => message.sources = sources.clone(),
            StreamEvent::TokenDelta { text } => message.content.push_str(text),
            StreamEvent::StreamEnded => {
                message.pending = false;
                message.citations = extract_citations(&message.content);
            }
        }
        true
    }

    /// Replaces the pending message with the finalized one from `output`.
    ///
    /// A message with an unknown id is appended.
    pub fn complete(&mut self, output: StreamOutput) {
        if let Some(thread_id) = output.thread_id {
            self.thread_id = Some(thread_id);
        }
        let message = output.message;
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(slot) => *slot = message,
            None => self.messages.push(message),
        }
    }

    /// Ids of assistant messages still streaming.
    pub fn pending_ids(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .filter(|m| m.pending)
            .map(|m| m.id.as_str())
    }
}
