//! The streaming relay: one task per turn that forwards a prompt to the chat
//! service, re-frames the streamed reply into [`StreamEvent`]s and commits
//! the assistant message once the upstream transport closes.

pub mod framing;
pub mod upstream;

pub use upstream::{ChatService, EchoChatService, HttpChatService, UpstreamRequest};

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;

use crate::db::{ChatRepository, MemoryStore, Message, Role};
use crate::error::AppError;
use crate::protocol::StreamEvent;
use framing::{parse_frame, Frame, LineBuffer};
use upstream::{fallback_reply, ByteStream};

/// Events buffered between the relay task and the HTTP response body.
const EVENT_BUFFER: usize = 32;

/// One validated turn whose user message is already persisted.
#[derive(Debug, Clone)]
pub struct Turn {
    pub chat_id: String,
    pub session_id: String,
    pub content: String,
    pub lat: f64,
    pub lng: f64,
    pub user_message: Message,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The assistant message was committed.
    Completed(Message),
    /// An `error` record was sent; nothing was committed.
    Failed(String),
    /// The client went away before the turn finished.
    Cancelled,
}

enum Source {
    Upstream(ByteStream),
    Fallback(String),
}

#[derive(Clone)]
pub struct Relay {
    store: MemoryStore,
    service: Arc<dyn ChatService>,
}

impl Relay {
    pub fn new(store: MemoryStore, service: Arc<dyn ChatService>) -> Self {
        Self { store, service }
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    /// Run `turn` on its own task and return the receiving end of its events.
    /// Dropping the receiver cancels the turn.
    pub fn spawn(&self, turn: Turn) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let relay = self.clone();

        tokio::spawn(async move {
            let chat_id = turn.chat_id.clone();
            match relay.run(turn, tx).await {
                TurnOutcome::Completed(message) => {
                    tracing::debug!(chat_id = %chat_id, message_id = %message.id, "turn completed")
                }
                TurnOutcome::Failed(reason) => {
                    tracing::warn!(chat_id = %chat_id, "turn failed: {}", reason)
                }
                TurnOutcome::Cancelled => {
                    tracing::info!(chat_id = %chat_id, "turn cancelled by client")
                }
            }
        });

        rx
    }

    /// Drive one turn to its terminal record.
    pub async fn run(&self, turn: Turn, events: mpsc::Sender<StreamEvent>) -> TurnOutcome {
        let Turn {
            chat_id,
            session_id,
            content,
            lat,
            lng,
            user_message,
        } = turn;

        if events
            .send(StreamEvent::UserMessage { data: user_message })
            .await
            .is_err()
        {
            return TurnOutcome::Cancelled;
        }

        let request = UpstreamRequest {
            session_id,
            prompt: content,
            lat,
            lng,
        };

        let opened = match until_closed(&events, self.service.open(&request)).await {
            Some(opened) => opened,
            None => return TurnOutcome::Cancelled,
        };

        let source = match opened {
            Ok(body) => Source::Upstream(body),
            Err(err) => {
                tracing::warn!(
                    service = self.service.name(),
                    "Chat service unavailable, relaying placeholder reply: {}",
                    err
                );
                Source::Fallback(fallback_reply(&request))
            }
        };

        if events.send(StreamEvent::StreamStart).await.is_err() {
            return TurnOutcome::Cancelled;
        }

        let mut full_response = String::new();

        match source {
            Source::Fallback(text) => {
                full_response.push_str(&text);
                if events.send(StreamEvent::Chunk { data: text }).await.is_err() {
                    return TurnOutcome::Cancelled;
                }
            }
            Source::Upstream(mut body) => {
                let mut lines = LineBuffer::new();

                // Only exhaustion of the body ends the loop; the in-band end
                // marker does not.
                loop {
                    let next = match until_closed(&events, body.next()).await {
                        Some(next) => next,
                        None => return TurnOutcome::Cancelled,
                    };

                    let fragment = match next {
                        None => break,
                        Some(Ok(fragment)) => fragment,
                        Some(Err(err)) => {
                            tracing::error!("Streaming error: {}", err);
                            return fail(&events, "Failed to stream response").await;
                        }
                    };

                    for line in lines.push(&fragment) {
                        let line = match String::from_utf8(line) {
                            Ok(line) => line,
                            Err(e) => {
                                let err = AppError::StreamProtocol(format!("invalid UTF-8 in frame: {}", e));
                                tracing::warn!("Skipping frame: {}", err);
                                continue;
                            }
                        };

                        match parse_frame(&line) {
                            Frame::Content(chunk) => {
                                full_response.push_str(&chunk);
                                if events.send(StreamEvent::Chunk { data: chunk }).await.is_err() {
                                    return TurnOutcome::Cancelled;
                                }
                            }
                            Frame::EndMarker => {
                                tracing::debug!("End marker received, waiting for transport close")
                            }
                            Frame::Ignored => {}
                        }
                    }
                }

                if lines.pending() > 0 {
                    tracing::debug!(bytes = lines.pending(), "Discarding unterminated trailing frame");
                }
            }
        }

        if events.is_closed() {
            return TurnOutcome::Cancelled;
        }

        let Some(assistant_message) =
            ChatRepository::append_message(&self.store, &chat_id, Role::Assistant, &full_response).await
        else {
            let err = AppError::Persistence(format!("chat {} disappeared before commit", chat_id));
            tracing::error!("{}", err);
            return fail(&events, "Failed to save assistant response").await;
        };

        // The message is committed either way; a vanished client only misses
        // the notification.
        let _ = events
            .send(StreamEvent::StreamComplete {
                data: assistant_message.clone(),
            })
            .await;

        TurnOutcome::Completed(assistant_message)
    }
}

/// Await `fut` unless the event receiver is dropped first.
async fn until_closed<T>(events: &mpsc::Sender<StreamEvent>, fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        _ = events.closed() => None,
        out = fut => Some(out),
    }
}

async fn fail(events: &mpsc::Sender<StreamEvent>, message: &str) -> TurnOutcome {
    let _ = events
        .send(StreamEvent::Error {
            error: message.to_string(),
        })
        .await;
    TurnOutcome::Failed(message.to_string())
}
