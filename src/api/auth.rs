use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse},
    Extension, Json,
};

use crate::api::middleware::Identity;
use crate::api::state::AppState;
use crate::db::{Session, SessionRepository, User, UserRepository};
use crate::error::AppError;
use crate::identity::{
    browser_fingerprint, client_ip, generate_session_id, identity_cookie, read_cookie,
    user_agent, SESSION_COOKIE_NAME, USER_COOKIE_NAME,
};
use crate::protocol::{ApiResponse, SessionData};

/// Returns the caller's user and session when both cookies still resolve.
async fn existing_identity(state: &AppState, headers: &HeaderMap) -> Option<(User, Session)> {
    let user_id = read_cookie(headers, USER_COOKIE_NAME)?;
    let session_id = read_cookie(headers, SESSION_COOKIE_NAME)?;

    let user = UserRepository::get_by_id(&state.store, &user_id).await?;
    let session = SessionRepository::get_by_id(&state.store, &session_id).await?;

    (session.user_id == user.id).then_some((user, session))
}

/// A browser whose cookie pair no longer validates keeps its user only when
/// it still presents that user's cookie and the latest session opened from
/// its fingerprint belongs to the same user. Returns the user and the
/// session being superseded.
async fn returning_user(
    state: &AppState,
    headers: &HeaderMap,
    fingerprint: &str,
) -> Option<(User, Session)> {
    let user_id = read_cookie(headers, USER_COOKIE_NAME)?;
    let previous = SessionRepository::latest_for_fingerprint(&state.store, fingerprint).await?;
    if previous.user_id != user_id {
        return None;
    }

    let user = UserRepository::get_by_id(&state.store, &user_id).await?;
    Some((user, previous))
}

/// POST /api/auth/init
pub async fn init(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    let user_agent = user_agent(&headers);
    let ip_address = client_ip(&headers, peer);
    let fingerprint = browser_fingerprint(&user_agent, &ip_address);

    if let Some((user, session)) = existing_identity(&state, &headers).await {
        UserRepository::touch(&state.store, &user.id).await;
        let user = UserRepository::get_by_id(&state.store, &user.id).await.unwrap_or(user);

        tracing::debug!(user_id = %user.id, "Existing session resumed");
        return Ok((
            AppendHeaders(Vec::<(header::HeaderName, String)>::new()),
            Json(ApiResponse::ok(SessionData {
                user,
                session,
                is_new_user: Some(false),
            })),
        ));
    }

    let session_id = generate_session_id(&user_agent, &ip_address);

    let (user, is_new_user) = match returning_user(&state, &headers, &fingerprint).await {
        Some((user, superseded)) => {
            SessionRepository::delete(&state.store, &superseded.id).await;
            (user, false)
        }
        None => (UserRepository::create(&state.store, &session_id).await, true),
    };

    let now = chrono::Utc::now();
    let session = Session {
        id: session_id,
        user_id: user.id.clone(),
        browser_fingerprint: fingerprint,
        ip_address,
        user_agent,
        created_at: now,
        expires_at: now + chrono::Duration::days(state.config.session_expiry_days),
    };
    SessionRepository::create(&state.store, session.clone()).await;
    UserRepository::touch(&state.store, &user.id).await;

    tracing::info!(user_id = %user.id, is_new_user, "Session created");

    let max_age = state.config.session_max_age_secs();
    let secure = state.config.cookie_secure;
    let cookies = vec![
        (header::SET_COOKIE, identity_cookie(USER_COOKIE_NAME, &user.id, max_age, secure)),
        (header::SET_COOKIE, identity_cookie(SESSION_COOKIE_NAME, &session.id, max_age, secure)),
    ];

    Ok((
        AppendHeaders(cookies),
        Json(ApiResponse::ok(SessionData {
            user,
            session,
            is_new_user: Some(is_new_user),
        })),
    ))
}

/// GET /api/auth/session (requires auth via middleware)
pub async fn session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<SessionData>>, AppError> {
    let user = UserRepository::get_by_id(&state.store, &identity.user_id)
        .await
        .ok_or_else(|| AppError::Auth("Invalid session".to_string()))?;
    let session = SessionRepository::get_by_id(&state.store, &identity.session_id)
        .await
        .ok_or_else(|| AppError::Auth("Session expired".to_string()))?;

    Ok(Json(ApiResponse::ok(SessionData {
        user,
        session,
        is_new_user: None,
    })))
}
