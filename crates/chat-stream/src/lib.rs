//! Incremental ingestion of the assistant's chat event stream.
//!
//! The backend answers a chat request with a chunked `text/event-stream` body
//! made of `data:` lines. This crate turns those bytes into typed
//! [`StreamEvent`]s, keeps the in-progress assistant [`ChatMessage`] current
//! after every event, and post-processes the finished text into citation
//! segments and suggested follow-up questions.
//!
//! # Streaming a request
//!
//! ```no_run
//! use chat_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), IngestError> {
//! let client = ChatClient::from_env()?;
//! let mut stream = client.stream(ChatRequest::new("Summarize week 3", "student@example.edu"))?;
//!
//! while let Some(event) = stream.next_event().await {
//!     if let StreamEvent::TokenDelta { text } = event {
//!         print!("{text}");
//!     }
//! }
//!
//! let output = stream.finish().await?;
//! let rendered = render_message(&output.message.content, &output.message.sources);
//! println!("\n{} suggestions", rendered.suggestions.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Feeding bytes by hand
//!
//! ```
//! use chat_stream::{StreamEvent, StreamIngestor};
//!
//! let mut ingestor = StreamIngestor::new();
//! let mut events = Vec::new();
//! let mut sink = |event: &StreamEvent, _: &chat_stream::ChatMessage| events.push(event.clone());
//! ingestor.push_chunk(b"data: {\"token\":\"Hel", &mut sink);
//! ingestor.push_chunk(b"lo\"}\ndata: [DONE]\n", &mut sink);
//! drop(sink);
//!
//! assert_eq!(ingestor.message().content, "Hello");
//! assert_eq!(events.last(), Some(&StreamEvent::StreamEnded));
//! ```

/// HTTP client that posts chat requests and streams the response.
pub mod client;
/// Public error types.
pub mod errors;
/// Normalized stream events.
pub mod event;
/// Synchronous protocol state machine.
pub mod ingestor;
/// Chat message, role and finalized stream output types.
pub mod message;
/// Process-wide tracing initialization.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Line framing and record classification for the wire protocol.
pub mod protocol;
/// Post-processing of finalized assistant text.
pub mod render;
/// Async driver, streaming handle and cancellation handle.
pub mod run;
/// Grounding source metadata.
pub mod source;
/// Id-keyed message list for one conversation thread.
pub mod transcript;

pub use client::{ChatClient, ChatClientConfig, ChatRequest, HistoryTurn};
pub use errors::{IngestError, StreamFailure};
pub use event::StreamEvent;
pub use ingestor::{APOLOGY_TEXT, EventSink, IngestState, StreamIngestor};
pub use message::{ChatMessage, Role, StreamOutcome, StreamOutput};
pub use render::{
    CitationRef, CitationTarget, InternalTag, PageAnnotations, RenderedMessage, Segment, TagTable,
    render_message, resolve_citation, strip_internal_tags,
};
pub use run::{AbortHandle, ByteStream, ChatStream, IngestOptions, ingest, ingest_into};
pub use source::Source;
pub use transcript::Transcript;
