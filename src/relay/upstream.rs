use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;

use crate::error::AppError;
use crate::relay::framing::{DATA_PREFIX, END_MARKER};

/// Raw response body of the upstream chat service.
pub type ByteStream = BoxStream<'static, Result<Bytes, AppError>>;

/// Body of the outbound request to the chat service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamRequest {
    pub session_id: String,
    pub prompt: String,
    pub lat: f64,
    pub lng: f64,
}

/// The text-generation backend the relay forwards prompts to.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Open a streaming request. An `Err` means the service could not be
    /// reached or refused the request; the relay then falls back to a
    /// placeholder reply.
    async fn open(&self, request: &UpstreamRequest) -> Result<ByteStream, AppError>;

    fn name(&self) -> &str;
}

/// Real upstream reached over HTTP.
pub struct HttpChatService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpChatService {
    pub fn new(endpoint: impl Into<String>, connect_timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ChatService for HttpChatService {
    async fn open(&self, request: &UpstreamRequest) -> Result<ByteStream, AppError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!("Chat service error: {}", status)));
        }

        Ok(response
            .bytes_stream()
            .map(|fragment| fragment.map_err(AppError::from))
            .boxed())
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Local stand-in for the chat service. Streams a placeholder reply one word
/// per frame, then the end marker, then closes.
pub struct EchoChatService {
    delay: Duration,
}

impl EchoChatService {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ChatService for EchoChatService {
    async fn open(&self, request: &UpstreamRequest) -> Result<ByteStream, AppError> {
        // Frames are newline-delimited, so the reply must stay on one line.
        let prompt = request.prompt.split_whitespace().collect::<Vec<_>>().join(" ");
        let reply = format!(
            "I received your message: \"{}\" Location: {:.4}, {:.4}. This is a mock streaming \
             response. Set CHAT_SERVICE_URL to connect to a real chat service.",
            prompt, request.lat, request.lng
        );

        let mut frames: Vec<String> = reply
            .split(' ')
            .enumerate()
            .map(|(i, word)| {
                let sep = if i == 0 { "" } else { " " };
                format!("{}{}{}\n\n", DATA_PREFIX, sep, word)
            })
            .collect();
        frames.push(format!("{}{}\n\n", DATA_PREFIX, END_MARKER));

        let delay = self.delay;
        Ok(stream::iter(frames)
            .then(move |frame| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok::<_, AppError>(Bytes::from(frame))
            })
            .boxed())
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// Reply relayed as a single chunk when the chat service is unavailable.
pub fn fallback_reply(request: &UpstreamRequest) -> String {
    format!(
        "I received your message: \"{}\"\n\nLocation: {:.4}, {:.4}\n\nThe chat service is \
         unavailable right now, so this is a placeholder response.",
        request.prompt, request.lat, request.lng
    )
}
