//! User-facing text for failed streams.

use std::fmt::Write;

use serde_json::Value;

pub const STREAM_ERROR_BADGE: &str = "[Stream error]";

const DETAIL_LIMIT: usize = 200;

/// Split `"API error {status}: {body}"` into its parts.
#[must_use]
pub fn split_api_error(raw: &str) -> Option<(String, String)> {
    let rest = raw.strip_prefix("API error ")?;
    let (status, body) = rest.split_once(": ")?;
    Some((status.trim().to_string(), body.trim().to_string()))
}

/// Pull a human-readable message out of a JSON error body.
#[must_use]
pub fn extract_error_message(raw: &str) -> Option<String> {
    let body = split_api_error(raw).map_or_else(|| raw.trim().to_string(), |(_, body)| body);
    let payload: Value = serde_json::from_str(&body).ok()?;
    payload
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| payload.pointer("/error").and_then(Value::as_str))
        .or_else(|| payload.pointer("/detail").and_then(Value::as_str))
        .or_else(|| payload.pointer("/message").and_then(Value::as_str))
        .or_else(|| payload.as_str())
        .map(ToString::to_string)
}

#[must_use]
pub fn is_auth_error(status: &str, detail: &str) -> bool {
    if status.starts_with("401") || status.starts_with("403") {
        return true;
    }
    let lower = detail.to_ascii_lowercase();
    lower.contains("unauthorized") || lower.contains("invalid api key")
}

fn truncate_with_ellipsis(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Format a stream error for display in the transcript.
#[must_use]
pub fn format_stream_error(err: &str) -> String {
    let trimmed = err.trim();
    let (status, body) =
        split_api_error(trimmed).unwrap_or_else(|| (String::new(), trimmed.to_string()));
    let extracted = extract_error_message(&body).unwrap_or_else(|| body.clone());

    let mut content = String::from(STREAM_ERROR_BADGE);
    content.push_str("\n\n");

    if is_auth_error(&status, &extracted) {
        content.push_str("The copilot backend rejected the request credentials.");
        let config_hint = canvas_config::config_path().map_or_else(
            || "~/.canvas/config.toml".to_string(),
            |p| p.display().to_string(),
        );
        let _ = write!(
            content,
            "\n\nFix:\n- Set api_key under [backend] in {config_hint}.\n- Then retry your message."
        );
        if !status.is_empty() {
            let _ = write!(content, "\n\nDetails: {status}");
        }
        return content;
    }

    let detail = if extracted.trim().is_empty() {
        "unknown error".to_string()
    } else {
        truncate_with_ellipsis(extracted.trim(), DETAIL_LIMIT)
    };
    if status.is_empty() {
        content.push_str("Request failed.");
    } else {
        let _ = write!(content, "Request failed ({status}).");
    }
    let _ = write!(content, "\n\nDetails: {detail}");
    content
}

#[cfg(test)]
mod tests {
    use super::{STREAM_ERROR_BADGE, extract_error_message, format_stream_error, split_api_error};

    #[test]
    fn splits_status_and_body() {
        assert_eq!(
            split_api_error("API error 500 Internal Server Error: boom"),
            Some(("500 Internal Server Error".to_string(), "boom".to_string()))
        );
        assert_eq!(split_api_error("connection reset"), None);
    }

    #[test]
    fn extracts_nested_messages() {
        assert_eq!(
            extract_error_message(r#"API error 400: {"error": {"message": "bad brief"}}"#),
            Some("bad brief".to_string())
        );
        assert_eq!(
            extract_error_message(r#"{"detail": "thread not found"}"#),
            Some("thread not found".to_string())
        );
        assert_eq!(extract_error_message("plain text"), None);
    }

    #[test]
    fn formats_backend_error_with_details() {
        let text = format_stream_error("Model overloaded");
        assert!(text.starts_with(STREAM_ERROR_BADGE));
        assert!(text.contains("Request failed."));
        assert!(text.contains("Details: Model overloaded"));
    }

    #[test]
    fn formats_http_status() {
        let text = format_stream_error(r#"API error 502 Bad Gateway: {"error": "upstream down"}"#);
        assert!(text.contains("Request failed (502 Bad Gateway)."), "{text}");
        assert!(text.contains("Details: upstream down"), "{text}");
    }

    #[test]
    fn auth_failures_point_at_config() {
        let text = format_stream_error("API error 401 Unauthorized: nope");
        assert!(text.contains("[backend]"), "{text}");
        assert!(text.contains("401 Unauthorized"), "{text}");
    }

    #[test]
    fn empty_error_still_has_detail() {
        let text = format_stream_error("   ");
        assert!(text.ends_with("Details: unknown error"), "{text}");
    }

    #[test]
    fn long_details_are_truncated() {
        let text = format_stream_error(&"x".repeat(500));
        assert!(text.ends_with('…'));
        assert!(text.len() < 400);
    }
}
