//! Chat backend that relays prompts to a streaming chat service and keeps
//! conversation history in memory, plus a client library that consumes the
//! relayed stream.

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod relay;

use std::sync::Arc;
use std::time::Duration;

use api::AppState;
use config::{ChatServiceMode, Config};
use db::MemoryStore;
use error::AppError;
use relay::{ChatService, EchoChatService, HttpChatService, Relay};

/// Chat service selected by configuration.
pub fn chat_service_from_config(config: &Config) -> Result<Arc<dyn ChatService>, AppError> {
    match config.chat_service_mode {
        ChatServiceMode::Http => {
            let url = config.chat_service_url.as_deref().ok_or_else(|| {
                AppError::Config("CHAT_SERVICE_URL is required in http mode".to_string())
            })?;
            Ok(Arc::new(HttpChatService::new(
                url,
                Duration::from_secs(config.upstream_connect_timeout_secs),
            )?))
        }
        ChatServiceMode::Echo => Ok(Arc::new(EchoChatService::new(Duration::from_millis(
            config.echo_chunk_delay_ms,
        )))),
    }
}

/// Application state with a fresh store and an explicit chat service.
pub fn build_state_with_service(config: Config, service: Arc<dyn ChatService>) -> AppState {
    let store = MemoryStore::new();
    AppState {
        relay: Relay::new(store.clone(), service),
        store,
        config: Arc::new(config),
    }
}

/// Application state with a fresh store and the configured chat service.
pub fn build_state(config: Config) -> Result<AppState, AppError> {
    let service = chat_service_from_config(&config)?;
    Ok(build_state_with_service(config, service))
}
