//! Shared test utilities and fixtures
//!
//! Common infrastructure for integration tests: a mock copilot backend that
//! answers with canned SSE bodies.

#![allow(dead_code)]

use std::sync::Arc;

use canvas_engine::{SessionController, SessionSettings};
use canvas_transport::{HttpTransport, StreamTransport, TransportConfig};
use canvas_types::{SessionId, StreamEvent, StreamRequest, ThreadId};
use serde_json::Value;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const STREAM_PATH: &str = "/chat/stream";

/// Start a mock server that simulates the copilot backend
pub async fn start_backend_mock() -> MockServer {
    MockServer::start().await
}

pub fn stream_url(server: &MockServer) -> String {
    format!("{}{STREAM_PATH}", server.uri())
}

/// Encode payloads as an SSE body, one `data:` event each.
pub fn sse_body(events: &[Value]) -> String {
    let mut body = String::new();
    for event in events {
        body.push_str(&format!("data: {event}\n\n"));
    }
    body
}

pub fn sse_response(events: &[Value]) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(sse_body(events))
        .insert_header("content-type", "text/event-stream")
}

/// Mount a streaming response for every request.
pub async fn mount_stream(server: &MockServer, events: &[Value]) {
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(sse_response(events))
        .mount(server)
        .await;
}

/// Mount a streaming response that answers exactly one request.
///
/// Mounted responses are consumed in mount order.
pub async fn mount_stream_once(server: &MockServer, events: &[Value]) {
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(sse_response(events))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

pub fn transport_for(server: &MockServer) -> HttpTransport {
    HttpTransport::new(TransportConfig::new(stream_url(server))).expect("loopback transport")
}

pub fn session_for(server: &MockServer) -> SessionController {
    session_with(server, SessionSettings::default())
}

pub fn session_with(server: &MockServer, settings: SessionSettings) -> SessionController {
    SessionController::new(Arc::new(transport_for(server)), settings)
}

pub fn request(message: &str) -> StreamRequest {
    StreamRequest::new(message, ThreadId::generate(), SessionId::generate())
}

/// Run one exchange to completion and collect every event it produced.
pub async fn collect_events(transport: &dyn StreamTransport, request: StreamRequest) -> Vec<StreamEvent> {
    let (tx, mut rx) = mpsc::channel(64);
    transport.open(request, tx).await;
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// Body of every request the mock received, in arrival order.
pub async fn received_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|request| serde_json::from_slice(&request.body).ok())
        .collect()
}
