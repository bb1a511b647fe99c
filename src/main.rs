use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamchat::{
    api::create_router,
    build_state,
    config::Config,
    db::SessionRepository,
    error::AppError,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,streamchat=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting streamchat server v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded");

    // In-memory store and chat service
    let state = build_state(config)?;
    match &state.config.chat_service_url {
        Some(url) if state.relay.service_name() == "http" => {
            tracing::info!("✅ Chat service: {}", url)
        }
        _ => tracing::warn!("⚠️  Chat service: echo mode, replies are placeholders"),
    }

    // Spawn background task for session cleanup
    {
        let store = state.store.clone();
        let every = Duration::from_secs(state.config.session_cleanup_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = SessionRepository::cleanup_expired(&store).await;
                tracing::debug!("🧹 Expired sessions cleaned up: {}", removed);
            }
        });
        tracing::info!(
            "✅ Session cleanup task started (every {}s)",
            state.config.session_cleanup_interval_secs
        );
    }

    // Bind and serve
    let addr = state.config.server_address();

    // Build router
    let app = create_router(state);

    tracing::info!("🌐 Server listening on http://{}", addr);
    tracing::info!("🏥 Health check: http://{}/api/health", addr);
    tracing::info!("");
    tracing::info!("📚 API Endpoints:");
    tracing::info!("  POST   /api/auth/init               - Bootstrap identity cookies");
    tracing::info!("  GET    /api/auth/session            - Current user and session");
    tracing::info!("  GET    /api/chats                   - List chats");
    tracing::info!("  POST   /api/chats                   - Create chat");
    tracing::info!("  GET    /api/chats/:chat_id          - Get chat");
    tracing::info!("  PATCH  /api/chats/:chat_id          - Rename chat");
    tracing::info!("  DELETE /api/chats/:chat_id          - Delete chat");
    tracing::info!("  GET    /api/chats/:chat_id/messages - List messages");
    tracing::info!("  POST   /api/messages                - Send message (event stream)");
    tracing::info!("");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    // Peer addresses feed the browser fingerprint when no proxy header is set
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|e| AppError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
