use crate::errors::StreamFailure;
use crate::render::CitationRef;
use crate::source::Source;

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One entry of a conversation.
///
/// Assistant messages start `pending` and are mutated in place while the
/// stream runs. The `id` is assigned at creation and never changes, so UI
/// code can key updates by it.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub citations: Vec<CitationRef>,
    #[serde(default)]
    pub pending: bool,
}

impl ChatMessage {
    fn with_role(role: Role, content: String, pending: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            sources: Vec::new(),
            citations: Vec::new(),
            pending,
        }
    }

    /// A submitted user query.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into(), false)
    }

    /// A system notice.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into(), false)
    }

    /// An empty assistant message waiting for stream output.
    pub fn pending_assistant() -> Self {
        Self::with_role(Role::Assistant, String::new(), true)
    }
}

/// How a stream ended.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StreamOutcome {
    /// Sentinel or natural end of input.
    Completed,
    /// Transport failure or cancellation; the message is still finalized.
    Failed(StreamFailure),
}

impl StreamOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn failure(&self) -> Option<&StreamFailure> {
        match self {
            Self::Completed => None,
            Self::Failed(failure) => Some(failure),
        }
    }
}

/// Finalized result of one chat request.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StreamOutput {
    /// Thread the backend assigned, if it announced one.
    pub thread_id: Option<String>,
    /// The assistant message, no longer pending.
    pub message: ChatMessage,
    pub outcome: StreamOutcome,
}
