//! Browser identity helpers: fingerprints, session ids and the cookie pair
//! that carries them.

use std::net::SocketAddr;

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const USER_COOKIE_NAME: &str = "ai-chat-user-id";
pub const SESSION_COOKIE_NAME: &str = "ai-chat-session-id";

/// Reported when neither the proxy chain nor the connection names an address.
pub const UNKNOWN_IP: &str = "0.0.0.0";

/// Stable hash of user agent and IP address.
pub fn browser_fingerprint(user_agent: &str, ip_address: &str) -> String {
    format!("{:x}", Sha256::digest(format!("{}:{}", user_agent, ip_address)))
}

/// Fresh, unguessable session id seeded with the browser fingerprint.
pub fn generate_session_id(user_agent: &str, ip_address: &str) -> String {
    let fingerprint = browser_fingerprint(user_agent, ip_address);
    let timestamp = chrono::Utc::now().timestamp_millis();
    let random = Uuid::new_v4();

    format!("{:x}", Sha256::digest(format!("{}-{}-{}", fingerprint, timestamp, random)))
}

/// Client address as reported by the proxy chain (first hop wins), else the
/// peer address of the connection.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(forwarded) = header_value("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            return first.trim().to_string();
        }
    }

    if let Some(ip) = header_value("x-real-ip").or_else(|| header_value("cf-connecting-ip")) {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

pub fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value for one identity cookie.
pub fn identity_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name, value, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Cookie` request header carrying both identity cookies.
pub fn cookie_header(user_id: &str, session_id: &str) -> String {
    format!(
        "{}={}; {}={}",
        USER_COOKIE_NAME, user_id, SESSION_COOKIE_NAME, session_id
    )
}
