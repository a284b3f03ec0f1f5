//! Operation state machine types.

use std::collections::HashMap;

use futures_util::future::AbortHandle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;

use canvas_types::{LoadingTarget, MessageId, StreamEvent};

use crate::ledger::ToolCallKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamKind {
    /// User-authored (or option follow-up) message.
    Message,
    /// Bootstrap request sent by `initialize_session`.
    Initialize,
}

impl StreamKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            StreamKind::Message => "message",
            StreamKind::Initialize => "initialize",
        }
    }
}

/// Everything tied to the one request in flight.
#[derive(Debug)]
pub(crate) struct ActiveStream {
    pub(crate) receiver: mpsc::Receiver<StreamEvent>,
    pub(crate) abort_handle: AbortHandle,
    pub(crate) kind: StreamKind,
    /// Streaming AI placeholder the events write into.
    pub(crate) message_id: MessageId,
    /// Element referenced by the outgoing message.
    pub(crate) element: Option<String>,
    /// Blocks referenced by the outgoing message.
    pub(crate) block_ids: Vec<String>,
    /// Regenerate tools that announced `START_BLOCK_LOADING` and have not finished.
    pub(crate) regenerating: HashMap<ToolCallKey, Vec<String>>,
    /// Event pulled off the channel while coalescing deltas, handled next.
    held: Option<StreamEvent>,
}

impl ActiveStream {
    pub(crate) fn new(
        receiver: mpsc::Receiver<StreamEvent>,
        abort_handle: AbortHandle,
        kind: StreamKind,
        message_id: MessageId,
        element: Option<String>,
        block_ids: Vec<String>,
    ) -> Self {
        Self {
            receiver,
            abort_handle,
            kind,
            message_id,
            element,
            block_ids,
            regenerating: HashMap::new(),
            held: None,
        }
    }

    pub(crate) fn try_next(&mut self) -> Result<StreamEvent, TryRecvError> {
        match self.held.take() {
            Some(event) => Ok(event),
            None => self.receiver.try_recv(),
        }
    }

    pub(crate) fn hold(&mut self, event: StreamEvent) {
        debug_assert!(self.held.is_none());
        self.held = Some(event);
    }

    pub(crate) fn has_held(&self) -> bool {
        self.held.is_some()
    }

    /// Loading targets this request marked busy.
    pub(crate) fn targets(&self) -> impl Iterator<Item = LoadingTarget> + '_ {
        self.element
            .iter()
            .map(LoadingTarget::element)
            .chain(self.block_ids.iter().map(LoadingTarget::block))
    }
}

/// Message queued by an option pick, sent once the session is idle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FollowUp {
    pub(crate) text: String,
    /// Element the picked option was applied to.
    pub(crate) element: String,
}

#[derive(Debug, Default)]
pub(crate) enum OperationState {
    #[default]
    Idle,
    Streaming(ActiveStream),
}

/// `STOP_BLOCK_LOADING` waiting out the grace delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingStop {
    pub(crate) due: Instant,
    /// Empty means the whole brief.
    pub(crate) block_ids: Vec<String>,
}

impl PendingStop {
    /// Whether an explicit stop for `ids` makes this one redundant.
    pub(crate) fn is_covered_by(&self, ids: &[String]) -> bool {
        if self.block_ids.is_empty() {
            return ids.is_empty();
        }
        self.block_ids.iter().all(|id| ids.contains(id))
    }

    /// Whether this stop will release `block_id` when it fires.
    pub(crate) fn releases(&self, block_id: &str) -> bool {
        self.block_ids.is_empty() || self.block_ids.iter().any(|id| id == block_id)
    }
}
