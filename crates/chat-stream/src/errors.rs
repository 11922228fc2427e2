/// Terminal failure of one chat stream.
///
/// A failure never escapes as an `Err` from the streaming API. It is recorded
/// in [`StreamOutcome::Failed`](crate::StreamOutcome::Failed) next to the
/// finalized message so callers can log it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum StreamFailure {
    /// Network or body read failure.
    #[error("transport failure: {message}")]
    Transport { message: String },
    /// Backend answered with a non-success status before streaming started.
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// The caller aborted the stream.
    #[error("stream cancelled")]
    Cancelled,
}

impl StreamFailure {
    /// Creates a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a status failure.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Returns true for caller-initiated cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors returned by the public API for misuse or bad configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
    /// Internal invariant violation (for example the driver task vanished).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl IngestError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_failure_display_includes_code_and_body() {
        let failure = StreamFailure::status(503, "upstream busy");
        assert_eq!(
            failure.to_string(),
            "backend returned status 503: upstream busy"
        );
        assert!(!failure.is_cancelled());
    }

    #[test]
    fn failure_serializes_with_variant_name() {
        let value = serde_json::to_value(StreamFailure::transport("reset")).expect("serialize");
        assert_eq!(value["Transport"]["message"], "reset");
    }
}
