use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::StreamExt;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::client::error::ClientError;
use crate::client::sse::TurnStream;
use crate::client::transport::{Connection, RetryPolicy};
use crate::db::models::{Chat, Message};
use crate::identity::cookie_header;
use crate::protocol::{
    ApiResponse, ChatData, ChatListData, CreateChatRequest, DeletedData, MessageListData,
    RenameChatRequest, SendMessageRequest, SessionData,
};

/// Identity pair the server issued on `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: String,
    pub session_id: String,
}

/// Typed access to the chat backend.
///
/// Credentials are taken from the `init` response body and replayed as a
/// `Cookie` header on every later request.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: Client,
    base_url: Url,
    credentials: Arc<RwLock<Option<Credentials>>>,
    retry: RetryPolicy,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("streamchat-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            credentials: Arc::new(RwLock::new(None)),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Resume an identity issued earlier.
    pub fn with_credentials(self, credentials: Credentials) -> Self {
        self.set_credentials(Some(credentials));
        self
    }

    pub fn credentials(&self) -> Option<Credentials> {
        match self.credentials.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => {
                tracing::warn!("Credential lock poisoned, reading last written value");
                poisoned.into_inner().clone()
            }
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn set_credentials(&self, credentials: Option<Credentials>) {
        let mut slot = self.credentials.write().unwrap_or_else(|poisoned| {
            tracing::warn!("Credential lock poisoned, overwriting");
            poisoned.into_inner()
        });
        *slot = credentials;
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let url = self.base_url.join(path)?;
        let mut builder = self.http.request(method, url);
        if let Some(c) = self.credentials() {
            builder = builder.header(header::COOKIE, cookie_header(&c.user_id, &c.session_id));
        }
        Ok(builder)
    }

    /// POST /api/auth/init
    pub async fn init_session(&self) -> Result<SessionData, ClientError> {
        let response = self.request(Method::POST, "/api/auth/init")?.send().await?;
        let data: SessionData = read_envelope(response).await?;

        self.set_credentials(Some(Credentials {
            user_id: data.user.id.clone(),
            session_id: data.session.id.clone(),
        }));
        tracing::debug!(
            user_id = %data.user.id,
            is_new_user = ?data.is_new_user,
            "Session initialized"
        );
        Ok(data)
    }

    /// GET /api/auth/session
    pub async fn current_session(&self) -> Result<SessionData, ClientError> {
        let response = self.authed(Method::GET, "/api/auth/session")?.send().await?;
        read_envelope(response).await
    }

    pub async fn list_chats(&self) -> Result<Vec<Chat>, ClientError> {
        let response = self.authed(Method::GET, "/api/chats")?.send().await?;
        let data: ChatListData = read_envelope(response).await?;
        Ok(data.chats)
    }

    pub async fn create_chat(&self, title: Option<&str>) -> Result<Chat, ClientError> {
        let body = CreateChatRequest {
            title: title.map(str::to_string),
        };
        let response = self
            .authed(Method::POST, "/api/chats")?
            .json(&body)
            .send()
            .await?;
        let data: ChatData = read_envelope(response).await?;
        Ok(data.chat)
    }

    pub async fn get_chat(&self, chat_id: &str) -> Result<Chat, ClientError> {
        let response = self
            .authed(Method::GET, &format!("/api/chats/{}", chat_id))?
            .send()
            .await?;
        let data: ChatData = read_envelope(response).await?;
        Ok(data.chat)
    }

    pub async fn rename_chat(&self, chat_id: &str, title: &str) -> Result<Chat, ClientError> {
        let body = RenameChatRequest {
            title: title.to_string(),
        };
        let response = self
            .authed(Method::PATCH, &format!("/api/chats/{}", chat_id))?
            .json(&body)
            .send()
            .await?;
        let data: ChatData = read_envelope(response).await?;
        Ok(data.chat)
    }

    pub async fn delete_chat(&self, chat_id: &str) -> Result<(), ClientError> {
        let response = self
            .authed(Method::DELETE, &format!("/api/chats/{}", chat_id))?
            .send()
            .await?;
        let _: DeletedData = read_envelope(response).await?;
        Ok(())
    }

    pub async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>, ClientError> {
        let response = self
            .authed(Method::GET, &format!("/api/chats/{}/messages", chat_id))?
            .send()
            .await?;
        let data: MessageListData = read_envelope(response).await?;
        Ok(data.messages)
    }

    /// POST /api/messages, retrying as `connection` allows until the event
    /// stream is open.
    pub async fn open_turn(
        &self,
        request: &SendMessageRequest,
        connection: &mut Connection,
    ) -> Result<TurnStream, ClientError> {
        loop {
            let attempt = self
                .authed(Method::POST, "/api/messages")?
                .header(header::ACCEPT, "text/event-stream")
                .json(request)
                .send()
                .await;

            let error = match attempt {
                Ok(response) if response.status().is_success() => {
                    connection.on_open();
                    return Ok(TurnStream::new(response.bytes_stream().boxed()));
                }
                Ok(response) => error_from_response(response).await,
                Err(e) => e.into(),
            };

            match connection.on_failure(&error) {
                Some(delay) => {
                    tokio::time::sleep(delay).await;
                    connection.retry();
                }
                None => return Err(error),
            }
        }
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        if self.credentials().is_none() {
            return Err(ClientError::NoSession);
        }
        self.request(method, path)
    }
}

async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }

    let envelope: ApiResponse<T> = response.json().await?;
    if !envelope.success {
        return Err(ClientError::Api(
            envelope.error.unwrap_or_else(|| "Unknown error".to_string()),
        ));
    }
    envelope
        .data
        .ok_or_else(|| ClientError::Decode("Response has no data".to_string()))
}

async fn error_from_response(response: Response) -> ClientError {
    let status = response.status();
    let message = match response.json::<ApiResponse<serde_json::Value>>().await {
        Ok(ApiResponse {
            error: Some(error), ..
        }) => error,
        _ => status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string(),
    };
    ClientError::Http {
        status: status.as_u16(),
        message,
    }
}
