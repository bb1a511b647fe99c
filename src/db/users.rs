use uuid::Uuid;
use crate::db::models::User;
use crate::db::MemoryStore;

pub struct UserRepository;

impl UserRepository {
    pub async fn create(store: &MemoryStore, session_id: &str) -> User {
        let now = chrono::Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            created_at: now,
            last_active_at: now,
        };

        store
            .tables
            .write()
            .await
            .users
            .insert(user.id.clone(), user.clone());

        user
    }

    pub async fn get_by_id(store: &MemoryStore, id: &str) -> Option<User> {
        store.tables.read().await.users.get(id).cloned()
    }

    /// Linear scan; the user table only ever holds this process's users.
    pub async fn find_by_session_id(store: &MemoryStore, session_id: &str) -> Option<User> {
        store
            .tables
            .read()
            .await
            .users
            .values()
            .find(|user| user.session_id == session_id)
            .cloned()
    }

    /// Record activity. Unknown ids are ignored.
    pub async fn touch(store: &MemoryStore, id: &str) {
        if let Some(user) = store.tables.write().await.users.get_mut(id) {
            user.last_active_at = chrono::Utc::now();
        }
    }
}
