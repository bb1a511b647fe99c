//! In-memory storage for users, sessions and chats.
//!
//! Everything lives for the lifetime of the process. A single
//! [`MemoryStore`] is built at startup and shared (cheaply cloned) with every
//! request handler; the repositories operate on it.

pub mod models;
pub mod users;
pub mod sessions;
pub mod chats;

pub use models::{Chat, Message, Role, Session, User};
pub use users::UserRepository;
pub use sessions::SessionRepository;
pub use chats::ChatRepository;

use std::collections::HashMap;
use std::sync::Arc;
use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Default)]
pub(crate) struct Tables {
    pub(crate) users: HashMap<String, User>,
    pub(crate) sessions: HashMap<String, Session>,
    pub(crate) chats: HashMap<String, Chat>,
    // user id -> chat ids, in creation order
    pub(crate) user_chats: HashMap<String, Vec<String>>,
}

/// Process-wide store handle. Every repository call takes the lock once, so
/// each operation is atomic with respect to the others.
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub(crate) tables: Arc<RwLock<Tables>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub users: usize,
    pub sessions: usize,
    pub chats: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stats(&self) -> StoreStats {
        let tables = self.tables.read().await;
        StoreStats {
            users: tables.users.len(),
            sessions: tables.sessions.len(),
            chats: tables.chats.len(),
        }
    }
}
