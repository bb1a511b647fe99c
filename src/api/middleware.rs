use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::api::state::AppState;
use crate::db::{SessionRepository, UserRepository};
use crate::error::AppError;
use crate::identity::{read_cookie, SESSION_COOKIE_NAME, USER_COOKIE_NAME};

/// The authenticated caller, inserted into request extensions by
/// [`auth_middleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub session_id: String,
}

/// Authentication middleware - validates the identity cookie pair
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let headers = request.headers();

    let (Some(user_id), Some(session_id)) = (
        read_cookie(headers, USER_COOKIE_NAME),
        read_cookie(headers, SESSION_COOKIE_NAME),
    ) else {
        return Err(AppError::Auth("Unauthorized".to_string()));
    };

    // Unknown and expired sessions look the same from here
    let session = SessionRepository::get_by_id(&state.store, &session_id)
        .await
        .ok_or_else(|| AppError::Auth("Invalid or expired session".to_string()))?;

    if session.user_id != user_id {
        return Err(AppError::Auth("Invalid or expired session".to_string()));
    }

    if UserRepository::get_by_id(&state.store, &user_id).await.is_none() {
        return Err(AppError::Auth("Invalid or expired session".to_string()));
    }

    UserRepository::touch(&state.store, &user_id).await;

    request.extensions_mut().insert(Identity { user_id, session_id });

    Ok(next.run(request).await)
}
