//! Stream lifecycle: spawning requests and applying their events.

use std::time::SystemTime;

use futures_util::future::{AbortHandle, Abortable};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;

use canvas_types::{
    ErrorOrigin, LoadingTarget, MessageId, SessionStatus, StreamEvent, StreamRequest, ToolStatus,
    UiCommand,
};

use crate::SessionController;
use crate::errors::format_stream_error;
use crate::ledger::{LedgerChange, ToolCallUpdate};
use crate::state::{ActiveStream, OperationState, PendingStop, StreamKind};

/// Bound on events buffered between the transport task and the controller.
const STREAM_EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
pub(crate) enum StreamEnd {
    Complete(Vec<String>),
    Failed { error: String, origin: ErrorOrigin },
    Cancelled,
}

impl SessionController {
    pub(crate) fn start_stream(
        &mut self,
        request: StreamRequest,
        kind: StreamKind,
        element: Option<String>,
        block_ids: Vec<String>,
    ) -> MessageId {
        let message_id = self.transcript.begin_ai();

        let (tx, rx) = mpsc::channel(STREAM_EVENT_CHANNEL_CAPACITY);
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        let stream = self.transport.open(request, tx);
        tokio::spawn(async move {
            let _ = Abortable::new(stream, abort_registration).await;
        });

        let active = ActiveStream::new(rx, abort_handle, kind, message_id, element, block_ids);
        for target in active.targets() {
            self.loading.add(target);
        }
        tracing::debug!(
            kind = kind.as_str(),
            message = message_id.value(),
            "Stream started"
        );
        self.state = OperationState::Streaming(active);
        message_id
    }

    /// Drain buffered stream events, up to the configured budget.
    ///
    /// Consecutive text deltas are merged before they reach the transcript;
    /// every merged delta counts towards the budget.
    pub fn process_stream_events(&mut self) -> usize {
        let budget = self.settings.event_budget.max(1);
        let mut processed = 0usize;

        while processed < budget {
            let OperationState::Streaming(active) = &mut self.state else {
                break;
            };
            let event = match active.try_next() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("Stream channel disconnected");
                    StreamEvent::transport_error("stream disconnected")
                }
            };
            processed = processed.saturating_add(1);

            let event = match event {
                StreamEvent::Message { mut content } => {
                    while processed < budget {
                        match active.try_next() {
                            Ok(StreamEvent::Message { content: more }) => {
                                content.push_str(&more);
                                processed = processed.saturating_add(1);
                            }
                            Ok(other) => {
                                active.hold(other);
                                break;
                            }
                            Err(_) => break,
                        }
                    }
                    StreamEvent::Message { content }
                }
                other => other,
            };

            self.handle_stream_event(event);
        }

        processed
    }

    pub(crate) fn handle_stream_event(&mut self, event: StreamEvent) {
        let OperationState::Streaming(active) = &self.state else {
            tracing::debug!(kind = event.kind(), "Dropping event with no active stream");
            return;
        };
        let message_id = active.message_id;

        match event {
            StreamEvent::ToolCall {
                tool,
                status,
                message,
                call_id,
            } => self.apply_tool_call(ToolCallUpdate {
                tool,
                status,
                message,
                call_id,
            }),
            StreamEvent::Message { content } => {
                self.transcript.append(message_id, &content);
            }
            StreamEvent::Complete {
                follow_up_suggestions,
            } => self.finish_stream(StreamEnd::Complete(follow_up_suggestions)),
            StreamEvent::Error { error, origin } => {
                self.finish_stream(StreamEnd::Failed { error, origin });
            }
            StreamEvent::UiCommand { commands } => {
                for command in commands {
                    if let UiCommand::StopBlockLoading { block_ids } = &command {
                        self.cancel_covered_stops(block_ids);
                    }
                    self.dispatch_command(command);
                }
            }
            StreamEvent::ElementOptions { options, element } => {
                if options.is_empty() {
                    tracing::debug!(element = %element, "Ignoring empty option set");
                    return;
                }
                if let Some(previous) = self.options.pending_element()
                    && previous != element
                {
                    let target = LoadingTarget::element(previous);
                    self.loading.remove(&target);
                }
                self.options.present(options, element, message_id);
            }
            StreamEvent::UpdatedBlocks { blocks, selective } => {
                self.dispatch_command(UiCommand::UpdateBlocks { blocks, selective });
            }
        }
    }

    fn apply_tool_call(&mut self, update: ToolCallUpdate) {
        let OperationState::Streaming(active) = &mut self.state else {
            return;
        };
        let Some(message) = self.transcript.get_mut(active.message_id) else {
            return;
        };

        let key = update.key();
        let tool = update.tool.clone();
        let change = message.tool_calls_mut().upsert(update, SystemTime::now());

        let command = match change {
            LedgerChange::Ignored { current, attempted } => {
                tracing::debug!(
                    tool = %tool,
                    current = current.as_str(),
                    attempted = attempted.as_str(),
                    "Ignoring tool status regression"
                );
                None
            }
            LedgerChange::Inserted(ToolStatus::Started)
                if self.settings.is_regenerate_tool(&tool) =>
            {
                let block_ids = active.block_ids.clone();
                active.regenerating.insert(key, block_ids.clone());
                Some(UiCommand::StartBlockLoading { block_ids })
            }
            change if change.reached_terminal() => {
                if let Some(block_ids) = active.regenerating.remove(&key) {
                    self.pending_stops.push(PendingStop {
                        due: Instant::now() + self.settings.grace_delay,
                        block_ids,
                    });
                }
                None
            }
            _ => None,
        };

        if let Some(command) = command {
            self.dispatch_command(command);
        }
    }

    /// Apply a command's local side effects, then forward it to subscribers.
    pub(crate) fn dispatch_command(&mut self, command: UiCommand) {
        match &command {
            UiCommand::StartBlockLoading { block_ids } => {
                for id in block_ids {
                    self.loading.add(LoadingTarget::block(id));
                }
            }
            UiCommand::StopBlockLoading { block_ids } => {
                if block_ids.is_empty() {
                    self.loading.retain(|target| !target.is_block());
                } else {
                    for id in block_ids {
                        self.loading.remove(&LoadingTarget::block(id));
                    }
                }
            }
            UiCommand::UpdateBlocks { blocks, selective } => {
                if *selective {
                    for block in blocks {
                        self.loading.remove(&LoadingTarget::block(&block.id));
                    }
                } else {
                    self.loading.retain(|target| !target.is_block());
                }
            }
            UiCommand::UpdateField { field, .. } => {
                self.loading.remove(&LoadingTarget::element(field));
            }
            UiCommand::Custom { .. } => {}
        }

        if self.commands.emit(&command) == 0 {
            tracing::debug!(command = command.name(), "No UI command subscriber, dropping");
        }
    }

    /// A backend `STOP_BLOCK_LOADING` replaces our own delayed stop for the same blocks.
    fn cancel_covered_stops(&mut self, block_ids: &[String]) {
        let before = self.pending_stops.len();
        self.pending_stops
            .retain(|stop| !stop.is_covered_by(block_ids));
        let cancelled = before - self.pending_stops.len();
        if cancelled > 0 {
            tracing::debug!(cancelled, "Backend stop superseded pending block stops");
        }
    }

    pub(crate) fn fire_due_stops(&mut self, now: Instant) {
        if self.pending_stops.is_empty() {
            return;
        }
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_stops)
            .into_iter()
            .partition(|stop| stop.due <= now);
        self.pending_stops = waiting;
        for stop in due {
            self.dispatch_command(UiCommand::StopBlockLoading {
                block_ids: stop.block_ids,
            });
        }
    }

    pub(crate) fn finish_stream(&mut self, end: StreamEnd) {
        let OperationState::Streaming(active) = std::mem::take(&mut self.state) else {
            return;
        };
        active.abort_handle.abort();

        let ActiveStream {
            kind,
            message_id,
            element,
            block_ids,
            regenerating,
            ..
        } = active;
        let running: Vec<Vec<String>> = regenerating.into_values().collect();

        match end {
            StreamEnd::Complete(suggestions) => {
                self.transcript.complete(message_id, suggestions);
                self.status = SessionStatus::Ready;
                // Tools that never reported back get the usual grace period.
                let due = Instant::now() + self.settings.grace_delay;
                self.pending_stops.extend(
                    running
                        .into_iter()
                        .map(|block_ids| PendingStop { due, block_ids }),
                );
                self.release_targets(element, block_ids, true);
                tracing::info!(kind = kind.as_str(), "Stream complete");
            }
            StreamEnd::Failed { error, origin } => {
                let text = format_stream_error(&error);
                match origin {
                    ErrorOrigin::Transport => self.transcript.fail(message_id, &text),
                    ErrorOrigin::Backend => {
                        self.transcript.freeze(message_id);
                        self.transcript.remove_if_blank(message_id);
                        self.transcript.push_ai(text);
                    }
                }
                self.status = SessionStatus::Error;
                for block_ids in running {
                    self.dispatch_command(UiCommand::StopBlockLoading { block_ids });
                }
                self.release_targets(element, block_ids, false);
                tracing::warn!(kind = kind.as_str(), ?origin, %error, "Stream failed");
            }
            StreamEnd::Cancelled => {
                self.transcript.freeze(message_id);
                self.status = SessionStatus::Ready;
                for block_ids in running {
                    self.dispatch_command(UiCommand::StopBlockLoading { block_ids });
                }
                self.release_targets(element, block_ids, false);
                tracing::info!(kind = kind.as_str(), "Stream cancelled");
            }
        }
    }

    /// Clear the targets a request marked busy.
    ///
    /// With `keep_pending`, an element still awaiting an option choice and
    /// blocks owed a delayed stop stay loading.
    fn release_targets(&mut self, element: Option<String>, block_ids: Vec<String>, keep_pending: bool) {
        if let Some(element) = element {
            let awaiting_choice =
                keep_pending && self.options.pending_element() == Some(element.as_str());
            if !awaiting_choice {
                self.loading.remove(&LoadingTarget::element(&element));
            }
        }
        for id in block_ids {
            let awaiting_stop =
                keep_pending && self.pending_stops.iter().any(|stop| stop.releases(&id));
            if !awaiting_stop {
                self.loading.remove(&LoadingTarget::block(&id));
            }
        }
    }
}
