//! Client library for the chat backend.
//!
//! [`ChatClient`] is the typed HTTP surface. [`Conversation`] drives turns
//! through it and keeps a [`ConsumerState`] in step with the event stream.

pub mod api;
pub mod error;
pub mod geo;
pub mod sse;
pub mod state;
pub mod transport;

pub use api::{ChatClient, Credentials};
pub use error::ClientError;
pub use geo::{Coordinates, Geolocator, Location, LocationSource};
pub use state::{ChatView, ConsumerState, Entry, MessageKey, StreamStatus, SETTLE_DELAY};
pub use transport::{classify, CloseReason, Connection, ConnectionState, Disposition, RetryPolicy};

use tokio_util::sync::CancellationToken;

use crate::db::models::{Chat, Message};
use crate::protocol::{SendMessageRequest, StreamEvent};

/// How a turn ended for the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEnd {
    Completed(Message),
    /// The server reported a failure in-band.
    Failed(String),
    Cancelled,
    /// The stream closed without a terminal record.
    Interrupted,
}

pub struct Conversation {
    client: ChatClient,
    state: ConsumerState,
}

impl Conversation {
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            state: ConsumerState::new(),
        }
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    pub fn state(&self) -> &ConsumerState {
        &self.state
    }

    /// Establish identity and load the chat list.
    pub async fn start(&mut self) -> Result<(), ClientError> {
        self.client.init_session().await?;
        let chats = self.client.list_chats().await?;
        self.state.set_chats(chats);
        Ok(())
    }

    pub async fn create_chat(&mut self, title: Option<&str>) -> Result<Chat, ClientError> {
        let chat = self.client.create_chat(title).await?;
        self.state.chat_created(chat.clone());
        Ok(chat)
    }

    pub async fn open_chat(&mut self, chat_id: &str) -> Result<(), ClientError> {
        let chat = self.client.get_chat(chat_id).await?;
        self.state.chat_loaded(chat);
        Ok(())
    }

    pub async fn rename_chat(&mut self, chat_id: &str, title: &str) -> Result<(), ClientError> {
        let chat = self.client.rename_chat(chat_id, title).await?;
        self.state.chat_renamed(&chat.id, &chat.title);
        Ok(())
    }

    pub async fn delete_chat(&mut self, chat_id: &str) -> Result<(), ClientError> {
        self.client.delete_chat(chat_id).await?;
        self.state.chat_deleted(chat_id);
        Ok(())
    }

    /// Run one turn to its end.
    ///
    /// Errors are returned only when the request never opened a stream; the
    /// state shows that failure as well. Everything after the stream opened
    /// is reported through [`TurnEnd`].
    pub async fn send(
        &mut self,
        chat_id: &str,
        content: &str,
        at: Coordinates,
        cancel: &CancellationToken,
    ) -> Result<TurnEnd, ClientError> {
        self.state.begin_turn(chat_id, content);

        let request = SendMessageRequest {
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            lat: Some(at.lat),
            lng: Some(at.lng),
        };
        let mut connection = Connection::new(self.client.retry_policy().clone());

        let opened = tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.client.open_turn(&request, &mut connection) => Some(result),
        };

        let mut stream = match opened {
            None => {
                connection.close(CloseReason::Cancelled);
                self.state.cancel();
                return Ok(TurnEnd::Cancelled);
            }
            Some(Err(e)) => {
                self.state.reject(e.to_string());
                return Err(e);
            }
            Some(Ok(stream)) => stream,
        };

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    drop(stream);
                    connection.close(CloseReason::Cancelled);
                    self.state.cancel();
                    tracing::debug!(chat_id, "Turn cancelled");
                    return Ok(TurnEnd::Cancelled);
                }
                next = stream.next_event() => next,
            };

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    tracing::warn!(chat_id, "Turn stream failed: {}", e);
                    connection.close(CloseReason::Failed(e.to_string()));
                    self.state.connection_lost();
                    return Ok(TurnEnd::Interrupted);
                }
                None => {
                    connection.close(CloseReason::Failed("stream closed early".to_string()));
                    self.state.connection_lost();
                    return Ok(TurnEnd::Interrupted);
                }
            };

            let end = match &event {
                StreamEvent::StreamComplete { data } => Some(TurnEnd::Completed(data.clone())),
                StreamEvent::Error { error } => Some(TurnEnd::Failed(error.clone())),
                _ => None,
            };
            self.state.apply(event);

            if let Some(end) = end {
                connection.close(CloseReason::Completed);
                return Ok(end);
            }
        }
    }

    /// Wait out [`SETTLE_DELAY`], then relax a completed status to idle.
    pub async fn settle(&mut self) {
        tokio::time::sleep(SETTLE_DELAY).await;
        self.state.settle();
    }
}
