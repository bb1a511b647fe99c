use uuid::Uuid;
use crate::db::models::{default_title, derive_title, Chat, Message, Role};
use crate::db::MemoryStore;

pub struct ChatRepository;

impl ChatRepository {
    /// A blank or missing title falls back to a dated default.
    pub async fn create(store: &MemoryStore, user_id: &str, title: Option<&str>) -> Chat {
        let now = chrono::Utc::now();
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_title(now));

        let chat = Chat {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let mut tables = store.tables.write().await;
        tables.chats.insert(chat.id.clone(), chat.clone());
        tables
            .user_chats
            .entry(user_id.to_string())
            .or_default()
            .push(chat.id.clone());

        chat
    }

    pub async fn get_by_id(store: &MemoryStore, id: &str) -> Option<Chat> {
        store.tables.read().await.chats.get(id).cloned()
    }

    /// Most recently updated first.
    pub async fn list_for_user(store: &MemoryStore, user_id: &str) -> Vec<Chat> {
        let tables = store.tables.read().await;

        let mut chats: Vec<Chat> = tables
            .user_chats
            .get(user_id)
            .map(|ids| ids.iter().filter_map(|id| tables.chats.get(id)).cloned().collect())
            .unwrap_or_default();

        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        chats
    }

    /// Append a message. Returns `None` if the chat does not exist.
    ///
    /// The first message of a chat, when it comes from the user, replaces the
    /// chat title with a title derived from its content. This happens once.
    pub async fn append_message(
        store: &MemoryStore,
        chat_id: &str,
        role: Role,
        content: &str,
    ) -> Option<Message> {
        let mut tables = store.tables.write().await;
        let chat = tables.chats.get_mut(chat_id)?;

        let now = chrono::Utc::now();
        let message = Message {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            role,
            content: content.to_string(),
            timestamp: now,
        };

        chat.messages.push(message.clone());
        chat.updated_at = now;

        if chat.messages.len() == 1 && role == Role::User {
            chat.title = derive_title(content);
        }

        Some(message)
    }

    pub async fn messages(store: &MemoryStore, chat_id: &str) -> Vec<Message> {
        store
            .tables
            .read()
            .await
            .chats
            .get(chat_id)
            .map(|chat| chat.messages.clone())
            .unwrap_or_default()
    }

    pub async fn rename(store: &MemoryStore, chat_id: &str, title: &str) -> Option<Chat> {
        let mut tables = store.tables.write().await;
        let chat = tables.chats.get_mut(chat_id)?;

        chat.title = title.to_string();
        chat.updated_at = chrono::Utc::now();

        Some(chat.clone())
    }

    /// Idempotent: deleting an unknown id does nothing.
    pub async fn delete(store: &MemoryStore, chat_id: &str) {
        let mut tables = store.tables.write().await;

        if let Some(chat) = tables.chats.remove(chat_id) {
            if let Some(ids) = tables.user_chats.get_mut(&chat.user_id) {
                ids.retain(|id| id != chat_id);
            }
        }
    }
}
