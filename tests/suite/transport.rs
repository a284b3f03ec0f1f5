//! HTTP transport against a mock copilot backend.

use canvas_transport::{HttpTransport, StreamTransport, TransportConfig};
use canvas_types::{
    ContentBlock, ElementOption, ErrorOrigin, FrontendContext, StreamEvent, ToolStatus, UiCommand,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{
    STREAM_PATH, collect_events, mount_stream, received_bodies, request, start_backend_mock,
    stream_url, transport_for,
};

fn transport_error(events: &[StreamEvent]) -> &str {
    match events {
        [
            StreamEvent::Error {
                error,
                origin: ErrorOrigin::Transport,
            },
        ] => error.as_str(),
        other => panic!("expected a single transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn decodes_every_event_kind_in_order() {
    let server = start_backend_mock().await;
    mount_stream(
        &server,
        &[
            json!({"type": "tool_call", "tool": "regenerate_scene", "status": "started", "callId": "c1"}),
            json!({"type": "message", "content": "Working on "}),
            json!({"type": "message", "delta": "scene 2"}),
            json!({"type": "ui_command", "commands": [{"type": "UPDATE_FIELD", "field": "hook", "value": "Stop scrolling"}]}),
            json!({"type": "elementOptions", "element": "cta", "options": [{"id": "o1", "label": "Bold", "value": "Shop now"}]}),
            json!({"type": "updatedBlocks", "blocks": [{"id": "b2", "visual": "Close-up"}], "selective": true}),
            json!({"type": "tool_call", "tool": "regenerate_scene", "status": "completed", "callId": "c1"}),
            json!({"type": "complete", "followUpSuggestions": ["Try a question hook"]}),
        ],
    )
    .await;

    let events = collect_events(&transport_for(&server), request("Rework scene 2")).await;

    assert_eq!(
        events,
        vec![
            StreamEvent::ToolCall {
                tool: "regenerate_scene".to_string(),
                status: ToolStatus::Started,
                message: None,
                call_id: Some("c1".to_string()),
            },
            StreamEvent::Message {
                content: "Working on ".to_string(),
            },
            StreamEvent::Message {
                content: "scene 2".to_string(),
            },
            StreamEvent::UiCommand {
                commands: vec![UiCommand::UpdateField {
                    field: "hook".to_string(),
                    value: json!("Stop scrolling"),
                }],
            },
            StreamEvent::ElementOptions {
                options: vec![ElementOption {
                    id: "o1".to_string(),
                    label: "Bold".to_string(),
                    value: "Shop now".to_string(),
                }],
                element: "cta".to_string(),
            },
            StreamEvent::UpdatedBlocks {
                blocks: vec![ContentBlock::new("b2").with_field("visual", "Close-up")],
                selective: true,
            },
            StreamEvent::ToolCall {
                tool: "regenerate_scene".to_string(),
                status: ToolStatus::Completed,
                message: None,
                call_id: Some("c1".to_string()),
            },
            StreamEvent::Complete {
                follow_up_suggestions: vec!["Try a question hook".to_string()],
            },
        ]
    );
}

#[tokio::test]
async fn backend_error_event_keeps_backend_origin() {
    let server = start_backend_mock().await;
    mount_stream(
        &server,
        &[
            json!({"type": "message", "content": "Let me"}),
            json!({"type": "error", "message": "quota exceeded"}),
        ],
    )
    .await;

    let events = collect_events(&transport_for(&server), request("Hi")).await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[1], StreamEvent::backend_error("quota exceeded"));
}

#[tokio::test]
async fn http_error_becomes_single_transport_error() {
    let server = start_backend_mock().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(
            ResponseTemplate::new(500).set_body_string(r#"{"detail":"upstream exploded"}"#),
        )
        .mount(&server)
        .await;

    let events = collect_events(&transport_for(&server), request("Hi")).await;

    let error = transport_error(&events);
    assert!(error.starts_with("API error 500"), "{error}");
    assert!(error.contains("upstream exploded"), "{error}");
}

#[tokio::test]
async fn unknown_and_untyped_payloads_are_skipped() {
    let server = start_backend_mock().await;
    mount_stream(
        &server,
        &[
            json!({"type": "heartbeat"}),
            json!({"content": "no type"}),
            json!({"type": "message", "content": "kept"}),
            json!({"type": "complete"}),
        ],
    )
    .await;

    let events = collect_events(&transport_for(&server), request("Hi")).await;

    assert_eq!(
        events,
        vec![
            StreamEvent::Message {
                content: "kept".to_string(),
            },
            StreamEvent::Complete {
                follow_up_suggestions: Vec::new(),
            },
        ]
    );
}

#[tokio::test]
async fn done_marker_completes_stream() {
    let server = start_backend_mock().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("data: {\"type\":\"message\",\"content\":\"ok\"}\n\ndata: [DONE]\n\n")
                .insert_header("content-type", "text/event-stream"),
        )
        .mount(&server)
        .await;

    let events = collect_events(&transport_for(&server), request("Hi")).await;

    assert_eq!(
        events.last(),
        Some(&StreamEvent::Complete {
            follow_up_suggestions: Vec::new(),
        })
    );
}

#[tokio::test]
async fn premature_eof_is_reported() {
    let server = start_backend_mock().await;
    mount_stream(&server, &[json!({"type": "message", "content": "half a tho"})]).await;

    let events = collect_events(&transport_for(&server), request("Hi")).await;

    assert_eq!(events.len(), 2);
    assert_eq!(
        events[1],
        StreamEvent::transport_error("Connection closed before stream completed")
    );
}

#[tokio::test]
async fn nothing_is_delivered_after_a_terminal_event() {
    let server = start_backend_mock().await;
    mount_stream(
        &server,
        &[
            json!({"type": "complete", "followUpSuggestions": []}),
            json!({"type": "message", "content": "late"}),
            json!({"type": "error", "error": "late"}),
        ],
    )
    .await;

    let events = collect_events(&transport_for(&server), request("Hi")).await;

    assert_eq!(
        events,
        vec![StreamEvent::Complete {
            follow_up_suggestions: Vec::new(),
        }]
    );
}

#[tokio::test]
async fn repeated_garbage_aborts_with_invalid_payload() {
    let server = start_backend_mock().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("data: {nope\n\ndata: {nope\n\ndata: {nope\n\n")
                .insert_header("content-type", "text/event-stream"),
        )
        .mount(&server)
        .await;

    let events = collect_events(&transport_for(&server), request("Hi")).await;

    let error = transport_error(&events);
    assert!(error.starts_with("Invalid stream payload"), "{error}");
}

#[tokio::test]
async fn request_carries_identity_context_and_bearer_key() {
    let server = start_backend_mock().await;
    let mut req = request("Make it punchier");
    req.audit_ad_id = Some("ad-7".to_string());
    req.ad_account_id = Some("acct-1".to_string());
    req.frontend_context = Some(FrontendContext {
        selected_element: Some("hook".to_string()),
        selected_blocks: None,
    });

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(header("authorization", "Bearer sk-test"))
        .and(header("accept", "text/event-stream"))
        .and(body_partial_json(json!({
            "message": "Make it punchier",
            "thread_id": req.thread_id.as_str(),
            "session_id": req.session_id.as_str(),
            "audit_ad_id": "ad-7",
            "ad_account_id": "acct-1",
            "frontend_context": {"selected_element": "hook"},
            "stream": true,
        })))
        .respond_with(crate::common::sse_response(&[json!({"type": "complete"})]))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(
        TransportConfig::new(stream_url(&server)).with_api_key(Some("sk-test".to_string())),
    )
    .expect("loopback transport");
    let events = collect_events(&transport, req).await;

    assert_eq!(
        events,
        vec![StreamEvent::Complete {
            follow_up_suggestions: Vec::new(),
        }]
    );
    let bodies = received_bodies(&server).await;
    assert!(bodies[0].get("brief_data").is_none());
}

#[tokio::test]
async fn dropped_receiver_ends_the_exchange_quietly() {
    let server = start_backend_mock().await;
    mount_stream(
        &server,
        &[
            json!({"type": "message", "content": "a"}),
            json!({"type": "message", "content": "b"}),
            json!({"type": "complete"}),
        ],
    )
    .await;

    let (tx, rx) = tokio::sync::mpsc::channel(1);
    drop(rx);
    let transport: &dyn StreamTransport = &transport_for(&server);
    transport.open(request("Hi"), tx).await;
}
