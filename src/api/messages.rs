use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, Sse},
    Extension,
};
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;

use crate::api::chat::owned_chat;
use crate::api::extract::AppJson;
use crate::api::middleware::Identity;
use crate::api::state::AppState;
use crate::db::{ChatRepository, Role};
use crate::error::AppError;
use crate::protocol::{SendMessageRequest, StreamEvent};
use crate::relay::Turn;

/// POST /api/messages (requires auth)
///
/// Validation, ownership and the user message write all happen before the
/// stream opens, so those failures are ordinary JSON errors. Everything
/// after that is reported in-band.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    AppJson(req): AppJson<SendMessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if req.content.trim().is_empty() {
        return Err(AppError::Validation("Message content is required".to_string()));
    }

    let (Some(lat), Some(lng)) = (req.lat, req.lng) else {
        return Err(AppError::Validation("Location (lat, lng) is required".to_string()));
    };

    owned_chat(&state, &identity, &req.chat_id).await?;

    let user_message = ChatRepository::append_message(&state.store, &req.chat_id, Role::User, &req.content)
        .await
        .ok_or_else(|| AppError::Persistence("Failed to add message".to_string()))?;

    tracing::debug!(
        chat_id = %req.chat_id,
        service = state.relay.service_name(),
        "Starting turn"
    );

    let events = state.relay.spawn(Turn {
        chat_id: req.chat_id,
        session_id: identity.session_id,
        content: req.content,
        lat,
        lng,
        user_message,
    });

    let stream = ReceiverStream::new(events).map(|event: StreamEvent| {
        let json = serde_json::to_string(&event).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize stream event: {}", e);
            r#"{"type":"error","error":"Failed to stream response"}"#.to_string()
        });
        Ok(Event::default().data(json))
    });

    Ok(Sse::new(stream))
}
