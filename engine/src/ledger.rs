//! Per-message record of backend tool invocations.
//!
//! Entries are keyed by the backend call id when one is supplied and by tool
//! name otherwise, so repeated updates for the same invocation collapse into one
//! entry holding the last received status. A terminal entry never returns to
//! `started` (see [`ToolStatus::can_become`]).

use std::time::SystemTime;

use canvas_types::ToolStatus;

/// Identity used to match an update against an existing entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ToolCallKey {
    CallId(String),
    Tool(String),
}

impl ToolCallKey {
    #[must_use]
    pub fn new(tool: &str, call_id: Option<&str>) -> Self {
        match call_id {
            Some(id) if !id.is_empty() => ToolCallKey::CallId(id.to_owned()),
            _ => ToolCallKey::Tool(tool.to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    id: String,
    key: ToolCallKey,
    tool: String,
    status: ToolStatus,
    message: Option<String>,
    timestamp: SystemTime,
}

impl ToolCall {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn key(&self) -> &ToolCallKey {
        &self.key
    }

    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    #[must_use]
    pub fn status(&self) -> ToolStatus {
        self.status
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}

/// One incoming `tool_call` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallUpdate {
    pub tool: String,
    pub status: ToolStatus,
    pub message: Option<String>,
    pub call_id: Option<String>,
}

impl ToolCallUpdate {
    #[must_use]
    pub fn key(&self) -> ToolCallKey {
        ToolCallKey::new(&self.tool, self.call_id.as_deref())
    }
}

/// What [`ToolCallLedger::upsert`] did with an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerChange {
    Inserted(ToolStatus),
    Advanced { from: ToolStatus, to: ToolStatus },
    /// Same status again; only the message and timestamp were refreshed.
    Refreshed(ToolStatus),
    /// The update would have moved a terminal entry back to `started` and was dropped.
    Ignored {
        current: ToolStatus,
        attempted: ToolStatus,
    },
}

impl LedgerChange {
    /// Whether this update moved the entry into a terminal status.
    #[must_use]
    pub fn reached_terminal(self) -> bool {
        match self {
            LedgerChange::Inserted(status) => status.is_terminal(),
            LedgerChange::Advanced { to, .. } => to.is_terminal(),
            LedgerChange::Refreshed(_) | LedgerChange::Ignored { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallLedger {
    entries: Vec<ToolCall>,
}

impl ToolCallLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, update: ToolCallUpdate, now: SystemTime) -> LedgerChange {
        let key = update.key();
        let ToolCallUpdate {
            tool,
            status,
            message,
            ..
        } = update;

        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.key == key) {
            let current = entry.status;
            if !current.can_become(status) {
                return LedgerChange::Ignored {
                    current,
                    attempted: status,
                };
            }
            entry.status = status;
            entry.timestamp = now;
            if message.is_some() {
                entry.message = message;
            }
            return if current == status {
                LedgerChange::Refreshed(status)
            } else {
                LedgerChange::Advanced {
                    from: current,
                    to: status,
                }
            };
        }

        let id = match &key {
            ToolCallKey::CallId(call_id) => call_id.clone(),
            ToolCallKey::Tool(_) => format!("tool-{}", self.entries.len() + 1),
        };
        self.entries.push(ToolCall {
            id,
            key,
            tool,
            status,
            message,
            timestamp: now,
        });
        LedgerChange::Inserted(status)
    }

    #[must_use]
    pub fn get(&self, key: &ToolCallKey) -> Option<&ToolCall> {
        self.entries.iter().find(|entry| &entry.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolCall> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
