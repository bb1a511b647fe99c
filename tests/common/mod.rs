#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use streamchat::{
    api::create_router, build_state_with_service, config::Config, identity::cookie_header,
    protocol::StreamEvent, relay::EchoChatService,
};

pub fn echo_app() -> Router {
    let state = build_state_with_service(
        Config::default(),
        Arc::new(EchoChatService::new(Duration::ZERO)),
    );
    create_router(state)
}

pub struct Reply {
    pub status: StatusCode,
    pub set_cookies: Vec<String>,
    pub body: String,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

pub const DEFAULT_PEER: &str = "203.0.113.10:40000";

pub fn peer(addr: &str) -> SocketAddr {
    addr.parse().unwrap()
}

pub async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    user_agent: &str,
    body: Option<Value>,
) -> Reply {
    call_from(app, peer(DEFAULT_PEER), method, uri, cookie, user_agent, body).await
}

/// Like [`call`], with the connection coming from `from`.
pub async fn call_from(
    app: &Router,
    from: SocketAddr,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    user_agent: &str,
    body: Option<Value>,
) -> Reply {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::USER_AGENT, user_agent);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let mut request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    request.extensions_mut().insert(ConnectInfo(from));

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let set_cookies = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    Reply {
        status,
        set_cookies,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

/// A browser identity established through `init`.
pub struct Browser {
    pub peer: SocketAddr,
    pub user_agent: String,
    pub user_id: String,
    pub session_id: String,
}

impl Browser {
    pub async fn init(app: &Router, user_agent: &str) -> Self {
        Self::init_from(app, peer(DEFAULT_PEER), user_agent).await
    }

    pub async fn init_from(app: &Router, from: SocketAddr, user_agent: &str) -> Self {
        let reply = call_from(app, from, "POST", "/api/auth/init", None, user_agent, None).await;
        assert_eq!(reply.status, StatusCode::OK);
        let json = reply.json();

        Self {
            peer: from,
            user_agent: user_agent.to_string(),
            user_id: json["data"]["user"]["id"].as_str().unwrap().to_string(),
            session_id: json["data"]["session"]["id"].as_str().unwrap().to_string(),
        }
    }

    pub fn cookie(&self) -> String {
        cookie_header(&self.user_id, &self.session_id)
    }

    pub async fn get(&self, app: &Router, uri: &str) -> Reply {
        call_from(app, self.peer, "GET", uri, Some(&self.cookie()), &self.user_agent, None).await
    }

    pub async fn send(&self, app: &Router, method: &str, uri: &str, body: Value) -> Reply {
        call_from(app, self.peer, method, uri, Some(&self.cookie()), &self.user_agent, Some(body)).await
    }

    pub async fn delete(&self, app: &Router, uri: &str) -> Reply {
        call_from(app, self.peer, "DELETE", uri, Some(&self.cookie()), &self.user_agent, None).await
    }

    pub async fn create_chat(&self, app: &Router, title: Option<&str>) -> String {
        let reply = self
            .send(app, "POST", "/api/chats", serde_json::json!({ "title": title }))
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        reply.json()["data"]["chat"]["id"]
            .as_str()
            .unwrap()
            .to_string()
    }
}

/// Decode every `data:` record of an event-stream body.
pub fn parse_events(body: &str) -> Vec<StreamEvent> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|payload| serde_json::from_str(payload.trim()).unwrap())
        .collect()
}
