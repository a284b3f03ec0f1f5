//! Ordered chat history with at most one message streaming at a time.

use std::time::SystemTime;

use canvas_types::{MessageId, Role, Selection};

use crate::ledger::ToolCallLedger;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    id: MessageId,
    role: Role,
    content: String,
    timestamp: SystemTime,
    is_streaming: bool,
    tool_calls: ToolCallLedger,
    follow_up_suggestions: Vec<String>,
    /// What the user had selected when sending. Only set on user messages.
    selection: Option<Selection>,
}

impl ChatMessage {
    fn new(id: MessageId, role: Role, content: String, is_streaming: bool) -> Self {
        Self {
            id,
            role,
            content,
            timestamp: SystemTime::now(),
            is_streaming,
            tool_calls: ToolCallLedger::new(),
            follow_up_suggestions: Vec::new(),
            selection: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    #[must_use]
    pub fn tool_calls(&self) -> &ToolCallLedger {
        &self.tool_calls
    }

    pub(crate) fn tool_calls_mut(&mut self) -> &mut ToolCallLedger {
        &mut self.tool_calls
    }

    #[must_use]
    pub fn follow_up_suggestions(&self) -> &[String] {
        &self.follow_up_suggestions
    }

    #[must_use]
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }
}

#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    next_id: u64,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId::new(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    pub fn push_user(&mut self, content: impl Into<String>, selection: Option<Selection>) -> MessageId {
        let id = self.allocate_id();
        let mut message = ChatMessage::new(id, Role::User, content.into(), false);
        message.selection = selection;
        self.messages.push(message);
        id
    }

    /// Append an empty streaming AI placeholder.
    ///
    /// Any message still streaming is frozen first.
    pub fn begin_ai(&mut self) -> MessageId {
        if let Some(previous) = self.freeze_streaming() {
            tracing::warn!(message = previous.value(), "Froze a dangling streaming message");
        }
        let id = self.allocate_id();
        self.messages.push(ChatMessage::new(id, Role::Ai, String::new(), true));
        id
    }

    /// Append a complete AI message.
    pub fn push_ai(&mut self, content: impl Into<String>) -> MessageId {
        let id = self.allocate_id();
        self.messages
            .push(ChatMessage::new(id, Role::Ai, content.into(), false));
        id
    }

    /// Append a delta to `id` while it is still streaming.
    pub fn append(&mut self, id: MessageId, delta: &str) -> bool {
        match self.get_mut(id) {
            Some(message) if message.is_streaming => {
                message.content.push_str(delta);
                true
            }
            _ => false,
        }
    }

    /// Freeze `id` and attach its follow-up suggestions.
    pub fn complete(&mut self, id: MessageId, suggestions: Vec<String>) {
        if let Some(message) = self.get_mut(id) {
            message.is_streaming = false;
            message.follow_up_suggestions = suggestions;
        }
    }

    /// Freeze `id` with `text` appended as visible error output.
    pub fn fail(&mut self, id: MessageId, text: &str) {
        if let Some(message) = self.get_mut(id) {
            message.is_streaming = false;
            if !message.content.is_empty() {
                message.content.push_str("\n\n");
            }
            message.content.push_str(text);
        }
    }

    pub fn freeze(&mut self, id: MessageId) {
        if let Some(message) = self.get_mut(id) {
            message.is_streaming = false;
        }
    }

    fn freeze_streaming(&mut self) -> Option<MessageId> {
        let message = self.messages.iter_mut().find(|m| m.is_streaming)?;
        message.is_streaming = false;
        Some(message.id)
    }

    /// Remove `id` if it has no content and no tool activity.
    pub fn remove_if_blank(&mut self, id: MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| {
            m.id != id || !m.content.is_empty() || !m.tool_calls.is_empty()
        });
        self.messages.len() != before
    }

    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: MessageId) -> Option<&mut ChatMessage> {
        // Active messages sit at the tail.
        self.messages.iter_mut().rev().find(|m| m.id == id)
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub fn streaming_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_streaming).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop every message. Ids keep counting up.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
