mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, Router};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{parse_events, Browser};
use streamchat::{
    api::create_router, build_state_with_service, config::Config, protocol::StreamEvent,
    relay::HttpChatService,
};

fn app_for(endpoint: &str) -> Router {
    let service = HttpChatService::new(endpoint, Duration::from_secs(2)).unwrap();
    create_router(build_state_with_service(Config::default(), Arc::new(service)))
}

async fn run_turn(app: &Router, content: &str) -> Vec<StreamEvent> {
    let browser = Browser::init(app, "agent-a").await;
    let chat_id = browser.create_chat(app, None).await;

    let reply = browser
        .send(
            app,
            "POST",
            "/api/messages",
            json!({"chatId": chat_id, "content": content, "lat": 1.0, "lng": 2.0}),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    parse_events(&reply.body)
}

fn chunks(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Chunk { data } => Some(data.clone()),
            _ => None,
        })
        .collect()
}

fn completed_content(events: &[StreamEvent]) -> String {
    match events.last() {
        Some(StreamEvent::StreamComplete { data }) => data.content.clone(),
        other => panic!("turn did not complete: {:?}", other),
    }
}

#[tokio::test]
async fn relays_upstream_frames_until_close() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(body_partial_json(json!({"prompt": "Hi", "lat": 1.0, "lng": 2.0})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string("data: Hel\n\ndata: \"lo\"\n\ndata: [DONE]\n\ndata:  world\n\npartial"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let app = app_for(&format!("{}/chat", server.uri()));
    let events = run_turn(&app, "Hi").await;

    assert_eq!(events[1], StreamEvent::StreamStart);
    assert_eq!(chunks(&events), vec!["Hel", "lo", " world"]);
    assert_eq!(completed_content(&events), "Hello world");
}

#[tokio::test]
async fn error_status_falls_back_to_placeholder() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let app = app_for(&format!("{}/chat", server.uri()));
    let events = run_turn(&app, "Hi").await;

    let chunks = chunks(&events);
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].contains("I received your message: \"Hi\""));
    assert!(chunks[0].contains("1.0000, 2.0000"));
    assert_eq!(completed_content(&events), chunks[0]);
}

#[tokio::test]
async fn unreachable_service_falls_back_to_placeholder() {
    let app = app_for("http://127.0.0.1:9/chat");
    let events = run_turn(&app, "Hi").await;

    assert!(matches!(events[0], StreamEvent::UserMessage { .. }));
    assert_eq!(chunks(&events).len(), 1);
    assert!(completed_content(&events).contains("\"Hi\""));
}

#[tokio::test]
async fn empty_upstream_body_commits_empty_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("data: [DONE]\n\n"))
        .mount(&server)
        .await;

    let app = app_for(&format!("{}/chat", server.uri()));
    let events = run_turn(&app, "Hi").await;

    assert_eq!(events.len(), 3);
    assert_eq!(completed_content(&events), "");
}
