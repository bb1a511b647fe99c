use crate::db::models::Session;
use crate::db::MemoryStore;

pub struct SessionRepository;

impl SessionRepository {
    pub async fn create(store: &MemoryStore, session: Session) {
        store
            .tables
            .write()
            .await
            .sessions
            .insert(session.id.clone(), session);
    }

    /// Expired sessions are reported as absent even before cleanup runs.
    pub async fn get_by_id(store: &MemoryStore, id: &str) -> Option<Session> {
        let now = chrono::Utc::now();

        store
            .tables
            .read()
            .await
            .sessions
            .get(id)
            .filter(|session| !session.is_expired_at(now))
            .cloned()
    }

    /// Most recent session (expired or not) opened from this browser.
    pub async fn latest_for_fingerprint(store: &MemoryStore, fingerprint: &str) -> Option<Session> {
        store
            .tables
            .read()
            .await
            .sessions
            .values()
            .filter(|session| session.browser_fingerprint == fingerprint)
            .max_by_key(|session| session.created_at)
            .cloned()
    }

    pub async fn delete(store: &MemoryStore, id: &str) {
        store.tables.write().await.sessions.remove(id);
    }

    /// Returns how many sessions were removed.
    pub async fn cleanup_expired(store: &MemoryStore) -> usize {
        let now = chrono::Utc::now();
        let mut tables = store.tables.write().await;

        let before = tables.sessions.len();
        tables.sessions.retain(|_, session| session.expires_at >= now);
        before - tables.sessions.len()
    }
}
