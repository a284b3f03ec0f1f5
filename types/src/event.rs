//! Wire events decoded from the copilot backend stream.
//!
//! Each SSE `data:` payload is one JSON object discriminated by `type`. The
//! backend mixes snake_case and camelCase names; aliases accept both spellings.

use serde::{Deserialize, Serialize};

use crate::command::{ContentBlock, UiCommand};

/// Lifecycle of a backend tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Started,
    Completed,
    Failed,
}

impl ToolStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ToolStatus::Started => "started",
            ToolStatus::Completed => "completed",
            ToolStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, ToolStatus::Completed | ToolStatus::Failed)
    }

    /// Status never moves back to `started` once terminal.
    ///
    /// Repeating a status is allowed (progress pings), and a terminal status
    /// may be replaced by a later terminal one (`completed -> failed`).
    #[must_use]
    pub const fn can_become(self, next: ToolStatus) -> bool {
        !(self.is_terminal() && matches!(next, ToolStatus::Started))
    }
}

/// Where a terminal error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorOrigin {
    /// Sent by the backend as an `error` event.
    #[default]
    Backend,
    /// Synthesized locally for network, HTTP or decode failures.
    Transport,
}

/// One choice in an AI-offered option set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementOption {
    pub id: String,
    pub label: String,
    pub value: String,
}

/// Streaming event from the copilot backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Tool progress update. Repeated events for the same tool update one entry.
    #[serde(rename = "tool_call")]
    ToolCall {
        tool: String,
        status: ToolStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Distinguishes concurrent invocations of the same tool.
        #[serde(default, alias = "callId", skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
    },
    /// Assistant text delta.
    #[serde(rename = "message")]
    Message {
        #[serde(alias = "delta")]
        content: String,
    },
    /// Stream completed.
    #[serde(rename = "complete")]
    Complete {
        #[serde(default, alias = "followUpSuggestions")]
        follow_up_suggestions: Vec<String>,
    },
    /// Stream terminated with an error.
    #[serde(rename = "error")]
    Error {
        #[serde(alias = "message")]
        error: String,
        #[serde(skip)]
        origin: ErrorOrigin,
    },
    /// Opaque UI-mutation commands for the presentational layer.
    #[serde(rename = "ui_command")]
    UiCommand {
        #[serde(deserialize_with = "crate::command::lenient_commands")]
        commands: Vec<UiCommand>,
    },
    /// Choices the user should pick between for one element.
    #[serde(rename = "elementOptions")]
    ElementOptions {
        options: Vec<ElementOption>,
        element: String,
    },
    /// Batch block replacement; `selective` means only the listed blocks change.
    #[serde(rename = "updatedBlocks")]
    UpdatedBlocks {
        blocks: Vec<ContentBlock>,
        #[serde(default)]
        selective: bool,
    },
}

impl StreamEvent {
    /// Error produced locally when the stream itself failed.
    pub fn transport_error(error: impl Into<String>) -> Self {
        StreamEvent::Error {
            error: error.into(),
            origin: ErrorOrigin::Transport,
        }
    }

    pub fn backend_error(error: impl Into<String>) -> Self {
        StreamEvent::Error {
            error: error.into(),
            origin: ErrorOrigin::Backend,
        }
    }

    /// No events follow a terminal event.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            StreamEvent::ToolCall { .. } => "tool_call",
            StreamEvent::Message { .. } => "message",
            StreamEvent::Complete { .. } => "complete",
            StreamEvent::Error { .. } => "error",
            StreamEvent::UiCommand { .. } => "ui_command",
            StreamEvent::ElementOptions { .. } => "elementOptions",
            StreamEvent::UpdatedBlocks { .. } => "updatedBlocks",
        }
    }
}
