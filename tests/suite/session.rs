//! Session controller driven end to end over HTTP.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use canvas_engine::{
    BlockDetail, LoadingTarget, Role, STREAM_ERROR_BADGE, SessionSettings, SessionStatus, UiCommand,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{
    STREAM_PATH, mount_stream, mount_stream_once, received_bodies, session_for, session_with,
    start_backend_mock,
};

fn quick_grace() -> SessionSettings {
    SessionSettings {
        grace_delay: Duration::from_millis(20),
        ..SessionSettings::default()
    }
}

fn scene(id: &str, n: u32) -> BlockDetail {
    BlockDetail {
        id: id.to_string(),
        scene_number: n,
        script: format!("Line {n}"),
        visual: format!("Shot {n}"),
    }
}

#[tokio::test]
async fn element_message_round_trip() {
    let server = start_backend_mock().await;
    mount_stream(
        &server,
        &[
            json!({"type": "message", "content": "Here is a "}),
            json!({"type": "message", "content": "sharper hook."}),
            json!({"type": "ui_command", "commands": [{"type": "UPDATE_FIELD", "field": "hook", "value": "Wait for it"}]}),
            json!({"type": "complete", "followUpSuggestions": ["Make it shorter"]}),
        ],
    )
    .await;

    let mut session = session_for(&server);
    session.select_element(Some("hook"), Some("Hook"));
    let outcome = session.send_message("Make it punchier", None).await;

    assert!(outcome.is_started());
    assert_eq!(session.status(), SessionStatus::Ready);
    assert!(session.selection().is_none());
    assert!(session.loading_targets().is_empty());

    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role(), Role::User);
    assert_eq!(messages[0].content(), "Make it punchier");
    assert!(messages[0].selection().is_some());
    assert_eq!(messages[1].role(), Role::Ai);
    assert_eq!(messages[1].content(), "Here is a sharper hook.");
    assert!(!messages[1].is_streaming());
    assert_eq!(messages[1].follow_up_suggestions(), ["Make it shorter"]);

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["message"], "Make it punchier");
    assert_eq!(bodies[0]["frontend_context"]["selected_element"], "hook");
    assert_eq!(bodies[0]["thread_id"], session.identity().thread_id().as_str());
    assert_eq!(bodies[0]["session_id"], session.identity().session_id().as_str());
}

#[tokio::test]
async fn regenerate_brackets_blocks_with_start_and_delayed_stop() {
    let server = start_backend_mock().await;
    mount_stream(
        &server,
        &[
            json!({"type": "tool_call", "tool": "regenerate_scene", "status": "started"}),
            json!({"type": "updatedBlocks", "blocks": [{"id": "b1"}, {"id": "b2"}], "selective": true}),
            json!({"type": "tool_call", "tool": "regenerate_scene", "status": "completed"}),
            json!({"type": "message", "content": "Both scenes rewritten."}),
            json!({"type": "complete"}),
        ],
    )
    .await;

    let mut session = session_with(&server, quick_grace());
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let _subscription = session.subscribe_commands(move |command| {
        sink.lock().unwrap().push(command.clone());
    });

    session.select_blocks(
        vec!["b1".to_string(), "b2".to_string()],
        vec![scene("b1", 1), scene("b2", 2)],
    );
    session.send_message("Rewrite these", None).await;

    let ids = vec!["b1".to_string(), "b2".to_string()];
    let commands = log.lock().unwrap().clone();
    assert_eq!(commands.len(), 3, "{commands:?}");
    assert_eq!(
        commands[0],
        UiCommand::StartBlockLoading {
            block_ids: ids.clone()
        }
    );
    assert!(matches!(commands[1], UiCommand::UpdateBlocks { selective: true, .. }));
    assert_eq!(commands[2], UiCommand::StopBlockLoading { block_ids: ids });

    assert!(session.is_settled());
    assert!(!session.is_loading(&LoadingTarget::block("b1")));
    assert!(!session.is_loading(&LoadingTarget::block("b2")));

    let reply = &session.messages()[1];
    assert_eq!(reply.tool_calls().len(), 1);

    let bodies = received_bodies(&server).await;
    let blocks = &bodies[0]["frontend_context"]["selected_blocks"];
    assert_eq!(blocks[1]["scene_number"], 2);
    assert_eq!(blocks[1]["visual"], "Shot 2");
}

#[tokio::test]
async fn http_failure_surfaces_in_reply_and_allows_retry() {
    let server = start_backend_mock().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(
            ResponseTemplate::new(502).set_body_string(r#"{"error": {"message": "agent offline"}}"#),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_stream(
        &server,
        &[
            json!({"type": "message", "content": "Back online."}),
            json!({"type": "complete"}),
        ],
    )
    .await;

    let mut session = session_for(&server);
    session.select_element(Some("cta"), None);
    session.send_message("Try again", None).await;

    assert_eq!(session.status(), SessionStatus::Error);
    assert!(session.loading_targets().is_empty());
    let reply = session.messages().last().unwrap();
    assert!(reply.content().contains(STREAM_ERROR_BADGE));
    assert!(reply.content().contains("Request failed (502"));
    assert!(reply.content().contains("agent offline"));

    let outcome = session.send_message("Once more", None).await;
    assert!(outcome.is_started());
    assert_eq!(session.status(), SessionStatus::Ready);
    assert_eq!(session.messages().last().unwrap().content(), "Back online.");
}

#[tokio::test]
async fn backend_error_replaces_empty_reply() {
    let server = start_backend_mock().await;
    mount_stream(
        &server,
        &[json!({"type": "error", "error": "brief could not be parsed"})],
    )
    .await;

    let mut session = session_for(&server);
    session.send_message("Hello", None).await;

    assert_eq!(session.status(), SessionStatus::Error);
    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role(), Role::Ai);
    assert!(messages[1].content().starts_with(STREAM_ERROR_BADGE));
    assert!(messages[1].content().contains("brief could not be parsed"));
}

#[tokio::test]
async fn picking_an_option_applies_it_and_sends_follow_up() {
    let server = start_backend_mock().await;
    mount_stream_once(
        &server,
        &[
            json!({"type": "message", "content": "Pick a CTA:"}),
            json!({"type": "elementOptions", "element": "cta", "options": [
                {"id": "o1", "label": "Bold", "value": "Shop now"},
                {"id": "o2", "label": "Soft", "value": "Take a look"},
            ]}),
            json!({"type": "complete"}),
        ],
    )
    .await;
    mount_stream(
        &server,
        &[
            json!({"type": "message", "content": "Going with a softer close."}),
            json!({"type": "complete"}),
        ],
    )
    .await;

    let mut session = session_for(&server);
    let applied_log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&applied_log);
    let _subscription = session.subscribe_applied_options(move |applied| {
        sink.lock().unwrap().push((applied.element.clone(), applied.value.clone()));
    });

    session.select_element(Some("cta"), None);
    session.send_message("Give me CTA options", None).await;

    assert!(session.is_loading(&LoadingTarget::element("cta")));
    let offered = session.element_options().unwrap();
    assert_eq!(offered.options.len(), 2);

    let applied = session.select_option("o2", "").unwrap();
    assert_eq!(applied.follow_up, "Option 2 - Soft");
    assert!(!session.is_loading(&LoadingTarget::element("cta")));
    assert_eq!(
        *applied_log.lock().unwrap(),
        vec![("cta".to_string(), "Take a look".to_string())]
    );

    session.run_until_settled().await;

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[1]["message"], "Option 2 - Soft");
    assert_eq!(
        session.messages().last().unwrap().content(),
        "Going with a softer close."
    );
    assert_eq!(session.status(), SessionStatus::Ready);
}

#[tokio::test]
async fn initialize_binds_ad_and_seeds_brief() {
    let server = start_backend_mock().await;
    mount_stream(
        &server,
        &[
            json!({"type": "message", "content": "Draft brief ready."}),
            json!({"type": "complete"}),
        ],
    )
    .await;

    let mut session = session_for(&server);
    let outcome = session
        .initialize_session("ad-42", "acct-9", Some(json!({"headline": "Summer sale"})))
        .await;
    assert!(outcome.is_started());

    let messages = session.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role(), Role::Ai);
    assert_eq!(session.status(), SessionStatus::Ready);

    session.send_message("Shorter please", None).await;

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["audit_ad_id"], "ad-42");
    assert_eq!(bodies[0]["brief_data"]["headline"], "Summer sale");
    assert_eq!(bodies[0]["message"], session.settings().initialize_prompt.as_str());
    assert_eq!(bodies[1]["ad_account_id"], "acct-9");
    assert!(bodies[1].get("brief_data").is_none());
}

#[tokio::test]
async fn reset_keeps_identity_and_clears_conversation() {
    let server = start_backend_mock().await;
    mount_stream(
        &server,
        &[
            json!({"type": "message", "content": "Hi"}),
            json!({"type": "complete"}),
        ],
    )
    .await;

    let mut session = session_for(&server);
    let identity = session.identity().clone();
    session.send_message("Hello", None).await;
    assert_eq!(session.messages().len(), 2);

    session.reset_session();

    assert!(session.messages().is_empty());
    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(session.identity(), &identity);
}
