//! Client-side projection of chats and the turn in flight.
//!
//! A message the user just typed is shown immediately under a
//! [`MessageKey::Provisional`] key. It becomes [`MessageKey::Committed`] when
//! the server echoes it back with its real id, or is rolled back if the turn
//! never reached the server.

use chrono::{DateTime, Utc};

use crate::db::models::{derive_title, Chat, Message, Role};
use crate::protocol::StreamEvent;

/// Quiet period after a completed turn before the status drops to idle.
pub const SETTLE_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamStatus {
    #[default]
    Idle,
    Streaming,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKey {
    Provisional(u64),
    Committed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: MessageKey,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Entry {
    pub fn is_provisional(&self) -> bool {
        matches!(self.key, MessageKey::Provisional(_))
    }
}

impl From<Message> for Entry {
    fn from(message: Message) -> Self {
        Self {
            key: MessageKey::Committed(message.id),
            role: message.role,
            content: message.content,
            timestamp: message.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatView {
    pub id: String,
    pub title: String,
    pub entries: Vec<Entry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Chat> for ChatView {
    fn from(chat: Chat) -> Self {
        Self {
            id: chat.id,
            title: chat.title,
            entries: chat.messages.into_iter().map(Entry::from).collect(),
            created_at: chat.created_at,
            updated_at: chat.updated_at,
        }
    }
}

impl ChatView {
    fn replace_provisional(&mut self, tag: u64, message: &Message) -> bool {
        let key = MessageKey::Provisional(tag);
        let Some(entry) = self.entries.iter_mut().find(|e| e.key == key) else {
            return false;
        };
        *entry = Entry::from(message.clone());
        self.updated_at = message.timestamp;
        if self.entries.len() == 1 && message.role == Role::User {
            self.title = derive_title(&message.content);
        }
        true
    }

    fn drop_provisional(&mut self, tag: u64) {
        let key = MessageKey::Provisional(tag);
        self.entries.retain(|e| e.key != key);
    }

    fn push_committed(&mut self, message: &Message) {
        self.entries.push(Entry::from(message.clone()));
        self.updated_at = message.timestamp;
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveTurn {
    chat_id: String,
    tag: u64,
}

#[derive(Debug, Default)]
pub struct ConsumerState {
    pub chats: Vec<ChatView>,
    pub current_chat: Option<ChatView>,
    pub stream_status: StreamStatus,
    /// Assistant text received so far for the turn in flight.
    pub streaming_content: String,
    pub error: Option<String>,
    active: Option<ActiveTurn>,
    next_tag: u64,
}

impl ConsumerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    pub fn set_chats(&mut self, chats: Vec<Chat>) {
        self.chats = chats.into_iter().map(ChatView::from).collect();
    }

    pub fn chat_created(&mut self, chat: Chat) {
        let view = ChatView::from(chat);
        self.chats.insert(0, view.clone());
        self.current_chat = Some(view);
    }

    pub fn chat_loaded(&mut self, chat: Chat) {
        let view = ChatView::from(chat);
        if let Some(existing) = self.chats.iter_mut().find(|c| c.id == view.id) {
            *existing = view.clone();
        }
        self.current_chat = Some(view);
    }

    pub fn chat_renamed(&mut self, chat_id: &str, title: &str) {
        self.for_each_view(chat_id, |view| view.title = title.to_string());
    }

    pub fn chat_deleted(&mut self, chat_id: &str) {
        self.chats.retain(|c| c.id != chat_id);
        if self.current_chat.as_ref().is_some_and(|c| c.id == chat_id) {
            self.current_chat = None;
        }
    }

    /// Make an already listed chat current. Returns false if it is unknown.
    pub fn select_chat(&mut self, chat_id: &str) -> bool {
        match self.chats.iter().find(|c| c.id == chat_id) {
            Some(view) => {
                self.current_chat = Some(view.clone());
                true
            }
            None => false,
        }
    }

    /// Show `content` as a provisional user message and enter streaming.
    pub fn begin_turn(&mut self, chat_id: &str, content: &str) -> u64 {
        self.next_tag += 1;
        let tag = self.next_tag;

        let entry = Entry {
            key: MessageKey::Provisional(tag),
            role: Role::User,
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        self.for_each_view(chat_id, |view| view.entries.push(entry.clone()));

        self.active = Some(ActiveTurn {
            chat_id: chat_id.to_string(),
            tag,
        });
        self.stream_status = StreamStatus::Streaming;
        self.streaming_content.clear();
        self.error = None;
        tag
    }

    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::UserMessage { data } => {
                let Some(active) = self.active.clone() else {
                    tracing::debug!("Ignoring user_message outside a turn");
                    return;
                };
                self.for_each_view(&active.chat_id, |view| {
                    if !view.replace_provisional(active.tag, &data) {
                        view.push_committed(&data);
                    }
                });
            }
            StreamEvent::StreamStart => {
                self.stream_status = StreamStatus::Streaming;
            }
            StreamEvent::Chunk { data } => {
                self.streaming_content.push_str(&data);
            }
            StreamEvent::StreamComplete { data } => {
                self.for_each_view(&data.chat_id, |view| view.push_committed(&data));
                self.streaming_content.clear();
                self.stream_status = StreamStatus::Complete;
                self.active = None;
            }
            StreamEvent::Error { error } => {
                self.rollback();
                self.stream_status = StreamStatus::Error;
                self.error = Some(error);
            }
        }
    }

    /// The user abandoned the turn.
    pub fn cancel(&mut self) {
        self.rollback();
        self.stream_status = StreamStatus::Idle;
    }

    /// The stream ended without a terminal record.
    pub fn connection_lost(&mut self) {
        self.rollback();
        self.stream_status = StreamStatus::Idle;
    }

    /// The turn request itself failed.
    pub fn reject(&mut self, message: impl Into<String>) {
        self.rollback();
        self.stream_status = StreamStatus::Error;
        self.error = Some(message.into());
    }

    /// Drop `Complete` back to `Idle` once the settle period has passed.
    pub fn settle(&mut self) {
        if self.stream_status == StreamStatus::Complete {
            self.stream_status = StreamStatus::Idle;
        }
    }

    fn rollback(&mut self) {
        if let Some(active) = self.active.take() {
            self.for_each_view(&active.chat_id, |view| view.drop_provisional(active.tag));
        }
        self.streaming_content.clear();
    }

    fn for_each_view(&mut self, chat_id: &str, mut f: impl FnMut(&mut ChatView)) {
        if let Some(current) = self.current_chat.as_mut().filter(|c| c.id == chat_id) {
            f(current);
        }
        if let Some(listed) = self.chats.iter_mut().find(|c| c.id == chat_id) {
            f(listed);
        }
    }
}
