use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::api::extract::AppJson;
use crate::api::middleware::Identity;
use crate::api::state::AppState;
use crate::db::{Chat, ChatRepository};
use crate::error::AppError;
use crate::protocol::{
    ApiResponse, ChatData, ChatListData, CreateChatRequest, DeletedData, MessageListData,
    RenameChatRequest,
};

/// Fetch a chat the caller owns: 404 when absent, 403 when it belongs to
/// someone else.
pub(crate) async fn owned_chat(
    state: &AppState,
    identity: &Identity,
    chat_id: &str,
) -> Result<Chat, AppError> {
    let chat = ChatRepository::get_by_id(&state.store, chat_id)
        .await
        .ok_or_else(|| AppError::NotFound("Chat not found".to_string()))?;

    if chat.user_id != identity.user_id {
        tracing::warn!(chat_id, user_id = %identity.user_id, "Rejected access to foreign chat");
        return Err(AppError::Forbidden("Forbidden".to_string()));
    }

    Ok(chat)
}

/// GET /api/chats (requires auth)
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Json<ApiResponse<ChatListData>> {
    let chats = ChatRepository::list_for_user(&state.store, &identity.user_id).await;

    Json(ApiResponse::ok(ChatListData { chats }))
}

/// POST /api/chats (requires auth)
pub async fn create_chat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    AppJson(req): AppJson<CreateChatRequest>,
) -> Json<ApiResponse<ChatData>> {
    let chat = ChatRepository::create(&state.store, &identity.user_id, req.title.as_deref()).await;

    tracing::debug!(chat_id = %chat.id, "Chat created");

    Json(ApiResponse::ok(ChatData { chat }))
}

/// GET /api/chats/:chat_id (requires auth)
pub async fn get_chat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<ChatData>>, AppError> {
    let chat = owned_chat(&state, &identity, &chat_id).await?;

    Ok(Json(ApiResponse::ok(ChatData { chat })))
}

/// PATCH /api/chats/:chat_id (requires auth)
pub async fn rename_chat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<String>,
    AppJson(req): AppJson<RenameChatRequest>,
) -> Result<Json<ApiResponse<ChatData>>, AppError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }

    owned_chat(&state, &identity, &chat_id).await?;

    // The chat can vanish between the ownership check and the rename
    let chat = ChatRepository::rename(&state.store, &chat_id, title)
        .await
        .ok_or_else(|| AppError::NotFound("Chat not found".to_string()))?;

    Ok(Json(ApiResponse::ok(ChatData { chat })))
}

/// DELETE /api/chats/:chat_id (requires auth)
pub async fn delete_chat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<DeletedData>>, AppError> {
    owned_chat(&state, &identity, &chat_id).await?;

    ChatRepository::delete(&state.store, &chat_id).await;

    Ok(Json(ApiResponse::ok(DeletedData {
        message: "Chat deleted successfully".to_string(),
    })))
}

/// GET /api/chats/:chat_id/messages (requires auth)
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<MessageListData>>, AppError> {
    let chat = owned_chat(&state, &identity, &chat_id).await?;

    Ok(Json(ApiResponse::ok(MessageListData {
        messages: chat.messages,
    })))
}
