use std::time::Duration;

use futures::{StreamExt as _, stream};
use tracing::{debug, warn};

use crate::errors::{IngestError, StreamFailure};
use crate::message::{ChatMessage, Role};
use crate::run::{ByteStream, ChatStream, IngestOptions, ingest_into};

pub const BASE_URL_ENV: &str = "CHAT_STREAM_BASE_URL";
pub const TIMEOUT_ENV: &str = "CHAT_STREAM_TIMEOUT_SECS";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Thread id that asks the backend to open a new thread.
pub const NEW_THREAD: &str = "new";

/// Configuration for the chat backend client.
#[derive(Clone, Debug)]
pub struct ChatClientConfig {
    /// Base URL of the backend, without the `/api/chat/stream` path.
    pub base_url: String,
    /// Whole-request timeout, including the streamed body.
    pub timeout: Duration,
    pub ingest: IngestOptions,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ChatClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(300),
            ingest: IngestOptions::default(),
        }
    }

    /// Builds a config from `CHAT_STREAM_BASE_URL` and `CHAT_STREAM_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, IngestError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, IngestError> {
        let base_url = lookup(BASE_URL_ENV)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut config = Self::new(base_url.trim());
        if let Some(raw) = lookup(TIMEOUT_ENV).filter(|v| !v.trim().is_empty()) {
            let secs = raw.trim().parse::<u64>().map_err(|e| {
                IngestError::Config(format!("invalid {TIMEOUT_ENV} value {raw:?}: {e}"))
            })?;
            config = config.timeout(Duration::from_secs(secs));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ingest_options(mut self, options: IngestOptions) -> Self {
        self.ingest = options;
        self
    }

    pub fn stream_url(&self) -> String {
        format!("{}/api/chat/stream", self.base_url.trim_end_matches('/'))
    }

    fn validate(&self) -> Result<(), IngestError> {
        let url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            IngestError::Config(format!("invalid base_url {:?}: {e}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(IngestError::Config(format!(
                "base_url must use http or https, got {:?}",
                url.scheme()
            )));
        }
        if self.timeout.is_zero() {
            return Err(IngestError::Config("timeout must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Prior turn sent as conversation context.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

impl HistoryTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for HistoryTurn {
    fn from(message: &ChatMessage) -> Self {
        Self::new(message.role, message.content.clone())
    }
}

/// One user query.
///
/// The user identity travels with the request; the client holds no session.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    pub message: String,
    pub user_email: String,
    pub thread_id: String,
    pub history: Vec<HistoryTurn>,
    pub course_id: Option<String>,
    pub material_ids: Vec<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, user_email: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_email: user_email.into(),
            thread_id: NEW_THREAD.to_string(),
            history: Vec::new(),
            course_id: None,
            material_ids: Vec::new(),
        }
    }

    /// Continues an existing thread.
    pub fn thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = thread_id.into();
        self
    }

    pub fn history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn course_id(mut self, course_id: impl Into<String>) -> Self {
        self.course_id = Some(course_id.into());
        self
    }

    pub fn material_ids(mut self, material_ids: Vec<String>) -> Self {
        self.material_ids = material_ids;
        self
    }

    fn validate(&self) -> Result<(), IngestError> {
        if self.message.trim().is_empty() {
            return Err(IngestError::Validation("message must not be empty".into()));
        }
        if self.user_email.trim().is_empty() {
            return Err(IngestError::Validation(
                "user_email must not be empty".into(),
            ));
        }
        if self.thread_id.trim().is_empty() {
            return Err(IngestError::Validation(
                "thread_id must not be empty (use \"new\")".into(),
            ));
        }
        Ok(())
    }

    fn form(&self) -> Result<reqwest::multipart::Form, IngestError> {
        let mut form = reqwest::multipart::Form::new()
            .text("message", self.message.clone())
            .text("user_email", self.user_email.clone())
            .text("thread_id", self.thread_id.clone());
        if !self.history.is_empty() {
            let history = serde_json::to_string(&self.history)
                .map_err(|e| IngestError::Validation(format!("history not serializable: {e}")))?;
            form = form.text("history", history);
        }
        if let Some(course_id) = &self.course_id {
            form = form.text("course_id", course_id.clone());
        }
        if !self.material_ids.is_empty() {
            form = form.text("material_ids", self.material_ids.join(","));
        }
        Ok(form)
    }
}

/// Posts chat requests and streams the answers.
#[derive(Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    config: ChatClientConfig,
}

impl ChatClient {
    pub fn new(config: ChatClientConfig) -> Result<Self, IngestError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IngestError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, IngestError> {
        Self::new(ChatClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ChatClientConfig {
        &self.config
    }

    /// Sends `request` and streams the answer into a new pending message.
    ///
    /// Returns at once: the request is sent by the driver task, so the
    /// stream's [`AbortHandle`](crate::AbortHandle) also cancels a connect or
    /// a wait for response headers. Transport errors and non-success statuses
    /// do not surface as `Err`: the stream finalizes with the apology message
    /// and a [`StreamFailure`] outcome. `Err` means the request itself was
    /// invalid. Must be called from within a Tokio runtime.
    pub fn stream(&self, request: ChatRequest) -> Result<ChatStream, IngestError> {
        self.stream_into(request, ChatMessage::pending_assistant())
    }

    /// Like [`stream`](Self::stream), filling a caller-created pending
    /// message (for example one from [`Transcript::begin_assistant`](crate::Transcript::begin_assistant)).
    pub fn stream_into(
        &self,
        request: ChatRequest,
        message: ChatMessage,
    ) -> Result<ChatStream, IngestError> {
        request.validate()?;
        let form = request.form()?;
        debug!(
            message_id = %message.id,
            thread_id = %request.thread_id,
            history = request.history.len(),
            "starting chat stream"
        );

        let url = self.config.stream_url();
        let body = stream::once(open(self.client.clone(), url, form)).flatten();
        ingest_into(message, body, self.config.ingest.clone())
    }
}

async fn open(
    client: reqwest::Client,
    url: String,
    form: reqwest::multipart::Form,
) -> ByteStream {
    let response = match client.post(url).multipart(form).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "chat request failed");
            return failed(StreamFailure::transport(format!("chat request failed: {e}")));
        }
    };
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        warn!(status = status.as_u16(), "chat backend rejected request");
        return failed(StreamFailure::status(status.as_u16(), body));
    }
    Box::pin(
        response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StreamFailure::transport(e.to_string()))),
    )
}

fn failed(failure: StreamFailure) -> ByteStream {
    Box::pin(stream::iter([Err(failure)]))
}
