use std::sync::Arc;
use crate::config::Config;
use crate::db::MemoryStore;
use crate::relay::Relay;

#[derive(Clone)]
pub struct AppState {
    pub store: MemoryStore,
    pub relay: Relay,
    pub config: Arc<Config>,
}
