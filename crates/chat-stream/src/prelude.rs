//! Common imports for typical chat-stream usage.
pub use crate::{
    AbortHandle, ChatClient, ChatClientConfig, ChatMessage, ChatRequest, ChatStream,
    CitationRef, CitationTarget, HistoryTurn, IngestError, IngestOptions, Role, Segment, Source,
    StreamEvent, StreamFailure, StreamOutcome, StreamOutput, Transcript, render_message,
};
