use tokio::sync::watch;
use tracing::{debug, warn};

use crate::errors::StreamFailure;
use crate::event::StreamEvent;
use crate::message::{ChatMessage, StreamOutcome, StreamOutput};
use crate::protocol::{LineDecoder, Record, parse_line};
use crate::render::extract_citations;

/// Text shown when a request fails before any answer text arrived.
pub const APOLOGY_TEXT: &str =
    "Sorry, I couldn't reach the assistant right now. Please try again in a moment.";

/// Lifecycle of one ingestor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestState {
    Idle,
    Streaming,
    Completed,
    Failed,
}

impl IngestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Receives every event together with the message as updated by it.
pub trait EventSink {
    fn on_event(&mut self, event: &StreamEvent, message: &ChatMessage);
}

impl<F> EventSink for F
where
    F: FnMut(&StreamEvent, &ChatMessage),
{
    fn on_event(&mut self, event: &StreamEvent, message: &ChatMessage) {
        self(event, message)
    }
}

/// Sink that drops everything.
pub(crate) struct NoopSink;

impl EventSink for NoopSink {
    fn on_event(&mut self, _event: &StreamEvent, _message: &ChatMessage) {}
}

/// Turns the raw bytes of one chat response into [`StreamEvent`]s.
///
/// Single use: create one per request, feed it chunks in order, then call
/// [`finish`](Self::finish) on end of input or [`fail`](Self::fail) on a
/// transport error. Both leave the message finalized (`pending == false`).
/// Calls after a terminal state are ignored.
pub struct StreamIngestor {
    decoder: LineDecoder,
    message: ChatMessage,
    thread_id: Option<String>,
    progress: Option<String>,
    state: IngestState,
    failure: Option<StreamFailure>,
    abort: Option<watch::Receiver<bool>>,
}

impl Default for StreamIngestor {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamIngestor {
    pub fn new() -> Self {
        Self::for_message(ChatMessage::pending_assistant())
    }

    /// Streams into an existing pending message, keeping its id.
    pub fn for_message(mut message: ChatMessage) -> Self {
        message.pending = true;
        Self {
            decoder: LineDecoder::default(),
            message,
            thread_id: None,
            progress: None,
            state: IngestState::Idle,
            failure: None,
            abort: None,
        }
    }

    /// Binds the ingestor to an abort signal. Once the signal reads `true`
    /// no further event is applied.
    pub fn with_abort_signal(mut self, abort: watch::Receiver<bool>) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The message as of the last applied event.
    pub fn message(&self) -> &ChatMessage {
        &self.message
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Latest progress label.
    pub fn progress(&self) -> Option<&str> {
        self.progress.as_deref()
    }

    pub fn failure(&self) -> Option<&StreamFailure> {
        self.failure.as_ref()
    }

    /// Feeds one chunk, emitting events for every line it completes.
    pub fn push_chunk(&mut self, chunk: &[u8], sink: &mut impl EventSink) {
        if self.is_terminal() || self.aborted() {
            return;
        }
        if self.state == IngestState::Idle {
            debug!(message_id = %self.message.id, "chat stream started");
            self.state = IngestState::Streaming;
        }
        for line in self.decoder.push_chunk(chunk) {
            self.process_line(&line, sink);
            if self.is_terminal() {
                break;
            }
        }
    }

    /// End of input: flushes the trailing line and completes the stream.
    pub fn finish(&mut self, sink: &mut impl EventSink) {
        if self.is_terminal() {
            return;
        }
        if self.aborted() {
            self.fail(StreamFailure::Cancelled, sink);
            return;
        }
        if let Some(line) = self.decoder.finish() {
            self.process_line(&line, sink);
        }
        if !self.is_terminal() {
            self.complete(sink);
        }
    }

    /// Transport failure or cancellation.
    ///
    /// Partial content is kept. If nothing was received the message becomes
    /// [`APOLOGY_TEXT`], except on cancellation, which emits nothing.
    pub fn fail(&mut self, failure: StreamFailure, sink: &mut impl EventSink) {
        if self.is_terminal() {
            return;
        }
        let cancelled = failure.is_cancelled();
        if cancelled {
            debug!(message_id = %self.message.id, "chat stream cancelled");
        } else {
            warn!(
                message_id = %self.message.id,
                partial_bytes = self.message.content.len(),
                error = %failure,
                "chat stream failed"
            );
        }
        if !cancelled && self.message.content.is_empty() {
            self.message.content.push_str(APOLOGY_TEXT);
            sink.on_event(
                &StreamEvent::TokenDelta {
                    text: APOLOGY_TEXT.to_string(),
                },
                &self.message,
            );
        }
        self.state = IngestState::Failed;
        self.failure = Some(failure);
        self.finalize_message();
        if !cancelled {
            sink.on_event(&StreamEvent::StreamEnded, &self.message);
        }
    }

    /// Consumes the ingestor. A stream that never reached a terminal state is
    /// completed first.
    pub fn into_output(mut self) -> StreamOutput {
        if !self.is_terminal() {
            self.finish(&mut NoopSink);
        }
        let outcome = match self.failure {
            Some(failure) => StreamOutcome::Failed(failure),
            None => StreamOutcome::Completed,
        };
        StreamOutput {
            thread_id: self.thread_id,
            message: self.message,
            outcome,
        }
    }

    fn process_line(&mut self, line: &str, sink: &mut impl EventSink) {
        let Some(record) = parse_line(line) else {
            return;
        };
        if self.aborted() {
            return;
        }
        match record {
            Record::Done => self.complete(sink),
            Record::ThreadId(thread_id) => {
                debug!(message_id = %self.message.id, thread_id = %thread_id, "thread assigned");
                self.thread_id = Some(thread_id.clone());
                sink.on_event(&StreamEvent::ThreadAssigned { thread_id }, &self.message);
            }
            Record::Thinking(label) => {
                self.progress = Some(label.clone());
                sink.on_event(&StreamEvent::ProgressStep { label }, &self.message);
            }
            Record::Sources(sources) => {
                debug!(message_id = %self.message.id, count = sources.len(), "sources replaced");
                self.message.sources = sources.clone();
                sink.on_event(&StreamEvent::SourcesFound { sources }, &self.message);
            }
            Record::Token(text) => {
                self.message.content.push_str(&text);
                sink.on_event(&StreamEvent::TokenDelta { text }, &self.message);
            }
        }
    }

    fn complete(&mut self, sink: &mut impl EventSink) {
        self.state = IngestState::Completed;
        self.finalize_message();
        debug!(
            message_id = %self.message.id,
            content_bytes = self.message.content.len(),
            sources = self.message.sources.len(),
            "chat stream completed"
        );
        sink.on_event(&StreamEvent::StreamEnded, &self.message);
    }

    fn finalize_message(&mut self) {
        self.message.pending = false;
        self.message.citations = extract_citations(&self.message.content);
        self.progress = None;
    }

    fn aborted(&self) -> bool {
        self.abort.as_ref().is_some_and(|rx| *rx.borrow())
    }
}
