//! Config file to running session wiring.

use std::fs;
use std::time::Duration;

use canvas_config::CanvasConfig;
use canvas_engine::SessionSettings;
use tempfile::tempdir;

#[test]
fn session_settings_follow_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[backend]
url = "http://127.0.0.1:9/chat/stream"

[session]
grace_delay_ms = 150
regenerate_tools = ["rewrite_scene", "  "]
"#,
    )
    .unwrap();

    let config = CanvasConfig::load_from(&path).unwrap().unwrap();
    let settings = SessionSettings::from_config(config.session.as_ref());

    assert_eq!(settings.grace_delay, Duration::from_millis(150));
    assert_eq!(settings.regenerate_tools, vec!["rewrite_scene".to_string()]);
    assert!(settings.is_regenerate_tool("rewrite_scene"));
    assert!(!settings.is_regenerate_tool("regenerate_scene"));
    assert_eq!(
        settings.initialize_prompt,
        SessionSettings::default().initialize_prompt
    );
}

#[test]
fn missing_config_file_means_defaults() {
    let dir = tempdir().unwrap();
    let config = CanvasConfig::load_from(&dir.path().join("absent.toml")).unwrap();
    assert!(config.is_none());
    assert_eq!(
        SessionSettings::from_config(None),
        SessionSettings::default()
    );
}
