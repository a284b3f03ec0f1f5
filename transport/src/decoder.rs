//! Maps decoded SSE JSON payloads onto [`StreamEvent`]s.

use canvas_types::{StreamEvent, UiCommand};
use serde_json::Value;

const KNOWN_EVENT_TYPES: &[&str] = &[
    "tool_call",
    "message",
    "complete",
    "error",
    "ui_command",
    "elementOptions",
    "updatedBlocks",
];

#[derive(Debug)]
pub(crate) enum SseParseAction {
    /// Continue processing, no event to emit
    Continue,
    /// Emit this event and continue (or stop, when terminal)
    Emit(StreamEvent),
}

#[derive(Debug, Default)]
pub(crate) struct EventDecoder {
    skipped: usize,
}

impl EventDecoder {
    pub(crate) fn decode(&mut self, mut json: Value) -> SseParseAction {
        let Some(kind) = json.get("type").and_then(Value::as_str).map(str::to_owned) else {
            self.skipped = self.skipped.saturating_add(1);
            tracing::warn!("Stream payload without a type, skipping");
            return SseParseAction::Continue;
        };

        if !KNOWN_EVENT_TYPES.contains(&kind.as_str()) {
            self.skipped = self.skipped.saturating_add(1);
            tracing::debug!(kind = %kind, "Unknown stream event type, skipping");
            return SseParseAction::Continue;
        }

        if kind == "ui_command" {
            let Some(Value::Array(commands)) = json.get_mut("commands").map(Value::take) else {
                self.skipped = self.skipped.saturating_add(1);
                tracing::warn!("UI command event without a command list, skipping");
                return SseParseAction::Continue;
            };
            let commands = commands.into_iter().map(decode_command).collect();
            return SseParseAction::Emit(StreamEvent::UiCommand { commands });
        }

        match serde_json::from_value::<StreamEvent>(json) {
            Ok(event) => SseParseAction::Emit(event),
            Err(e) => {
                self.skipped = self.skipped.saturating_add(1);
                tracing::warn!(%e, kind = %kind, "Malformed stream event, skipping");
                SseParseAction::Continue
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn skipped(&self) -> usize {
        self.skipped
    }
}

fn decode_command(value: Value) -> UiCommand {
    UiCommand::from_value(value).unwrap_or_else(|(command, e)| {
        tracing::warn!(%e, name = command.name(), "Undecodable UI command, forwarding as-is");
        command
    })
}
