use std::pin::Pin;

use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::errors::{IngestError, StreamFailure};
use crate::event::StreamEvent;
use crate::ingestor::{EventSink, StreamIngestor};
use crate::message::{ChatMessage, StreamOutput};

/// Transport body as consumed by the driver.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, StreamFailure>> + Send + 'static>>;

/// Driver options.
#[derive(Clone, Debug)]
pub struct IngestOptions {
    /// Bounded event buffer between the driver task and the consumer.
    pub event_buffer_capacity: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            event_buffer_capacity: 128,
        }
    }
}

impl IngestOptions {
    pub fn event_buffer_capacity(mut self, capacity: usize) -> Self {
        self.event_buffer_capacity = capacity;
        self
    }

    fn validate(&self) -> Result<(), IngestError> {
        if self.event_buffer_capacity == 0 {
            return Err(IngestError::Validation(
                "event_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Handle used to stop a running stream.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// The read loop stops at its next await point, no further events are
    /// delivered, and the output records `StreamFailure::Cancelled`.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Starts ingesting `input` on a Tokio task.
///
/// Must be called from within a Tokio runtime.
pub fn ingest(
    input: impl futures::Stream<Item = Result<bytes::Bytes, StreamFailure>> + Send + 'static,
    options: IngestOptions,
) -> Result<ChatStream, IngestError> {
    ingest_into(ChatMessage::pending_assistant(), input, options)
}

/// Like [`ingest`], streaming into a caller-created pending message so its id
/// is known before the first byte arrives.
pub fn ingest_into(
    message: ChatMessage,
    input: impl futures::Stream<Item = Result<bytes::Bytes, StreamFailure>> + Send + 'static,
    options: IngestOptions,
) -> Result<ChatStream, IngestError> {
    options.validate()?;

    let (tx, rx) = mpsc::channel(options.event_buffer_capacity);
    let (final_tx, final_rx) = oneshot::channel();
    let (abort_tx, abort_rx) = watch::channel(false);

    let ingestor = StreamIngestor::for_message(message).with_abort_signal(abort_rx.clone());
    let message_id = ingestor.message().id.clone();
    let (snapshot_tx, snapshot_rx) = watch::channel(ingestor.message().clone());

    tokio::spawn(drive(
        Box::pin(input),
        ingestor,
        tx,
        snapshot_tx,
        final_tx,
        abort_rx,
    ));

    Ok(ChatStream {
        message_id,
        rx,
        snapshot_rx,
        final_rx,
        abort_handle: AbortHandle { tx: abort_tx },
    })
}

/// Streaming handle for one chat request.
///
/// Use `next_event()` to consume events as they arrive and `finish()` to
/// obtain the finalized message.
pub struct ChatStream {
    message_id: String,
    rx: mpsc::Receiver<StreamEvent>,
    snapshot_rx: watch::Receiver<ChatMessage>,
    final_rx: oneshot::Receiver<StreamOutput>,
    abort_handle: AbortHandle,
}

impl ChatStream {
    /// Stable id of the assistant message this stream fills.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Returns a handle that can cancel the stream.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next event. Returns `None` once the stream is over or
    /// has been aborted, even if events are still buffered.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.abort_handle.is_aborted() {
            return None;
        }
        let event = self.rx.recv().await?;
        if self.abort_handle.is_aborted() {
            return None;
        }
        Some(event)
    }

    /// The message with every event applied so far by the driver.
    ///
    /// May run ahead of events not yet taken with `next_event()`.
    pub fn current_message(&self) -> ChatMessage {
        self.snapshot_rx.borrow().clone()
    }

    /// Drains remaining events and returns the finalized output.
    ///
    /// Safe to call after consuming events manually with `next_event()`.
    pub async fn finish(mut self) -> Result<StreamOutput, IngestError> {
        while self.rx.recv().await.is_some() {}
        self.final_rx
            .await
            .map_err(|_| IngestError::protocol_msg("ingest task ended without final output"))
    }
}

/// Collects events from one synchronous ingestor step.
#[derive(Default)]
struct Collector {
    events: Vec<StreamEvent>,
}

impl EventSink for Collector {
    fn on_event(&mut self, event: &StreamEvent, _message: &ChatMessage) {
        self.events.push(event.clone());
    }
}

async fn drive(
    mut input: ByteStream,
    mut ingestor: StreamIngestor,
    tx: mpsc::Sender<StreamEvent>,
    snapshot_tx: watch::Sender<ChatMessage>,
    final_tx: oneshot::Sender<StreamOutput>,
    mut abort_rx: watch::Receiver<bool>,
) {
    let message_id = ingestor.message().id.clone();

    while !ingestor.is_terminal() {
        let mut step = Collector::default();
        tokio::select! {
            biased;
            () = abort_requested(&mut abort_rx) => ingestor.fail(StreamFailure::Cancelled, &mut step),
            next = input.next() => {
                match next {
                    Some(Ok(chunk)) => ingestor.push_chunk(&chunk, &mut step),
                    Some(Err(failure)) => ingestor.fail(failure, &mut step),
                    None => ingestor.finish(&mut step),
                }
            }
        }
        snapshot_tx.send_replace(ingestor.message().clone());

        for event in step.events {
            let delivered = tokio::select! {
                biased;
                () = abort_requested(&mut abort_rx) => false,
                sent = tx.send(event) => {
                    if sent.is_err() {
                        debug!(message_id = %message_id, "event receiver dropped; stopping stream");
                    }
                    sent.is_ok()
                }
            };
            if !delivered {
                ingestor.fail(StreamFailure::Cancelled, &mut Collector::default());
                break;
            }
        }
    }

    drop(input);
    let output = ingestor.into_output();
    snapshot_tx.send_replace(output.message.clone());
    debug!(message_id = %message_id, outcome = ?output.outcome, "chat stream finalized");
    let _ = final_tx.send(output);
}

/// Resolves once abort is requested. Never resolves if every handle is gone.
async fn abort_requested(abort_rx: &mut watch::Receiver<bool>) {
    if abort_rx.wait_for(|aborted| *aborted).await.is_err() {
        std::future::pending::<()>().await;
    }
}
