//! Public surface of the session controller.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;

use canvas_transport::StreamTransport;
use canvas_types::{
    BlockDetail, FrontendContext, LoadingTarget, MessageId, NonEmptyString, Selection,
    SessionStatus, StreamEvent, StreamRequest, UiCommand,
};

use crate::bridge::{Bridge, Subscription};
use crate::identity::SessionIdentity;
use crate::loading::LoadingTargets;
use crate::options::{AppliedOption, ElementOptionSet, OptionError, OptionPresentation};
use crate::selection::SelectionModel;
use crate::settings::SessionSettings;
use crate::state::{FollowUp, OperationState, PendingStop, StreamKind};
use crate::streaming::StreamEnd;
use crate::transcript::{ChatMessage, Transcript};

/// Why a send did not start a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRejection {
    /// A request is already in flight.
    Busy,
    EmptyMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Request issued; the id is the streaming AI placeholder.
    Started(MessageId),
    Rejected(SendRejection),
}

impl SendOutcome {
    #[must_use]
    pub fn is_started(self) -> bool {
        matches!(self, SendOutcome::Started(_))
    }

    #[must_use]
    pub fn message_id(self) -> Option<MessageId> {
        match self {
            SendOutcome::Started(id) => Some(id),
            SendOutcome::Rejected(_) => None,
        }
    }
}

/// Ad the session is about, attached to every request once initialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdContext {
    pub audit_ad_id: Option<String>,
    pub ad_account_id: Option<String>,
}

/// Single owner of all conversational state for one copilot session.
///
/// Requests run on a spawned task; their events are applied when the owner
/// calls [`poll`](Self::poll) or awaits [`wait_for_activity`](Self::wait_for_activity).
/// Methods that start a request must be called from within a Tokio runtime.
pub struct SessionController {
    pub(crate) identity: SessionIdentity,
    pub(crate) status: SessionStatus,
    pub(crate) transcript: Transcript,
    pub(crate) selection: SelectionModel,
    pub(crate) loading: LoadingTargets,
    pub(crate) options: OptionPresentation,
    pub(crate) commands: Bridge<UiCommand>,
    pub(crate) applied_options: Bridge<AppliedOption>,
    pub(crate) transport: Arc<dyn StreamTransport>,
    pub(crate) settings: SessionSettings,
    pub(crate) ad_context: AdContext,
    pub(crate) state: OperationState,
    pub(crate) pending_stops: Vec<PendingStop>,
    pub(crate) follow_ups: VecDeque<FollowUp>,
}

impl SessionController {
    #[must_use]
    pub fn new(transport: Arc<dyn StreamTransport>, settings: SessionSettings) -> Self {
        let identity = SessionIdentity::generate();
        tracing::debug!(
            thread_id = %identity.thread_id(),
            session_id = %identity.session_id(),
            "Session created"
        );
        Self {
            identity,
            status: SessionStatus::Idle,
            transcript: Transcript::new(),
            selection: SelectionModel::new(),
            loading: LoadingTargets::new(),
            options: OptionPresentation::new(),
            commands: Bridge::new(),
            applied_options: Bridge::new(),
            transport,
            settings,
            ad_context: AdContext::default(),
            state: OperationState::Idle,
            pending_stops: Vec::new(),
            follow_ups: VecDeque::new(),
        }
    }

    // ========================================================================
    // Observation
    // ========================================================================

    #[must_use]
    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        self.transcript.messages()
    }

    #[must_use]
    pub fn message(&self, id: MessageId) -> Option<&ChatMessage> {
        self.transcript.get(id)
    }

    #[must_use]
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.current()
    }

    #[must_use]
    pub fn loading_targets(&self) -> &LoadingTargets {
        &self.loading
    }

    #[must_use]
    pub fn is_loading(&self, target: &LoadingTarget) -> bool {
        self.loading.contains(target)
    }

    #[must_use]
    pub fn element_options(&self) -> Option<&ElementOptionSet> {
        self.options.current()
    }

    #[must_use]
    pub fn ad_context(&self) -> &AdContext {
        &self.ad_context
    }

    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Follow-up messages queued by option picks, oldest first.
    pub fn pending_follow_ups(&self) -> impl Iterator<Item = &str> {
        self.follow_ups.iter().map(|follow_up| follow_up.text.as_str())
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(self.state, OperationState::Streaming(_))
    }

    fn is_busy(&self) -> bool {
        self.is_streaming() || self.status.is_busy()
    }

    /// No request in flight, no grace timer pending and no follow-up queued.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !self.is_streaming() && self.pending_stops.is_empty() && self.follow_ups.is_empty()
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Receive every UI command, backend-sent or locally synthesized.
    pub fn subscribe_commands<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&UiCommand) + Send + 'static,
    {
        self.commands.subscribe(handler)
    }

    /// Receive the value of each option the user picks.
    pub fn subscribe_applied_options<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&AppliedOption) + Send + 'static,
    {
        self.applied_options.subscribe(handler)
    }

    // ========================================================================
    // Selection
    // ========================================================================

    pub fn select_element(&mut self, key: Option<&str>, label: Option<&str>) {
        self.selection.select_element(key, label);
    }

    pub fn select_blocks(&mut self, ids: Vec<String>, details: Vec<BlockDetail>) {
        self.selection.select_blocks(ids, details);
    }

    pub fn toggle_block(&mut self, id: &str, detail: Option<BlockDetail>) {
        self.selection.toggle_block(id, detail);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    // ========================================================================
    // Requests
    // ========================================================================

    fn request(&self, message: String) -> StreamRequest {
        let mut request = StreamRequest::new(
            message,
            self.identity.thread_id().clone(),
            self.identity.session_id().clone(),
        );
        request.audit_ad_id.clone_from(&self.ad_context.audit_ad_id);
        request.ad_account_id.clone_from(&self.ad_context.ad_account_id);
        request
    }

    /// Record a user message and open its stream without waiting for it.
    ///
    /// The current selection is snapshotted onto the message, its targets are
    /// marked loading and the selection is cleared. When `context` is `None` it
    /// is derived from the selection.
    pub fn start_message(&mut self, text: &str, context: Option<FrontendContext>) -> SendOutcome {
        if self.is_busy() {
            tracing::debug!(status = %self.status, "Send rejected while a request is in flight");
            return SendOutcome::Rejected(SendRejection::Busy);
        }
        let Ok(text) = NonEmptyString::new(text) else {
            return SendOutcome::Rejected(SendRejection::EmptyMessage);
        };

        let selection = self.selection.take();
        let context = context
            .or_else(|| selection.as_ref().and_then(FrontendContext::from_selection))
            .filter(|context| !context.is_empty());
        let element = selection
            .as_ref()
            .and_then(Selection::element_key)
            .map(str::to_owned);
        let block_ids = selection
            .as_ref()
            .map(|selection| selection.block_ids().to_vec())
            .unwrap_or_default();

        SendOutcome::Started(self.open_message(text, selection, context, element, block_ids))
    }

    fn open_message(
        &mut self,
        text: NonEmptyString,
        selection: Option<Selection>,
        context: Option<FrontendContext>,
        element: Option<String>,
        block_ids: Vec<String>,
    ) -> MessageId {
        // A new message supersedes options still on screen.
        self.clear_options();

        self.transcript.push_user(text.as_str(), selection);
        let mut request = self.request(text.into_inner());
        request.frontend_context = context;

        self.status = SessionStatus::Streaming;
        self.start_stream(request, StreamKind::Message, element, block_ids)
    }

    /// Send a user message and wait until the session settles.
    pub async fn send_message(&mut self, text: &str, context: Option<FrontendContext>) -> SendOutcome {
        let outcome = self.start_message(text, context);
        if outcome.is_started() {
            self.run_until_settled().await;
        }
        outcome
    }

    /// Bind the session to an ad and open the bootstrap stream.
    ///
    /// No user message is recorded; the AI reply streams into a new message.
    pub fn start_initialize(
        &mut self,
        audit_ad_id: impl Into<String>,
        ad_account_id: impl Into<String>,
        brief_data: Option<Value>,
    ) -> SendOutcome {
        if self.is_busy() {
            tracing::debug!(status = %self.status, "Initialize rejected while a request is in flight");
            return SendOutcome::Rejected(SendRejection::Busy);
        }

        self.ad_context = AdContext {
            audit_ad_id: Some(audit_ad_id.into()),
            ad_account_id: Some(ad_account_id.into()),
        };
        let mut request = self.request(self.settings.initialize_prompt.clone());
        request.brief_data = brief_data;

        self.status = SessionStatus::Initializing;
        tracing::info!(
            audit_ad_id = ?self.ad_context.audit_ad_id,
            ad_account_id = ?self.ad_context.ad_account_id,
            "Initializing session"
        );
        let message_id = self.start_stream(request, StreamKind::Initialize, None, Vec::new());
        SendOutcome::Started(message_id)
    }

    pub async fn initialize_session(
        &mut self,
        audit_ad_id: impl Into<String>,
        ad_account_id: impl Into<String>,
        brief_data: Option<Value>,
    ) -> SendOutcome {
        let outcome = self.start_initialize(audit_ad_id, ad_account_id, brief_data);
        if outcome.is_started() {
            self.run_until_settled().await;
        }
        outcome
    }

    // ========================================================================
    // Options
    // ========================================================================

    /// Apply the user's pick from the offered option set.
    ///
    /// Subscribers receive the option value, the element stops loading and
    /// `"Option {n} - {label}"` is queued as the next user message.
    pub fn select_option(&mut self, option_id: &str, label: &str) -> Result<AppliedOption, OptionError> {
        let applied = self.options.resolve(option_id, label)?;
        self.loading.remove(&LoadingTarget::element(&applied.element));

        if self.applied_options.emit(&applied) == 0 {
            tracing::debug!(element = %applied.element, "No option subscriber, value not applied");
        }
        self.follow_ups.push_back(FollowUp {
            text: applied.follow_up.clone(),
            element: applied.element.clone(),
        });
        Ok(applied)
    }

    /// Dismiss the offered options. An element still waiting on a choice stops loading.
    pub fn clear_options(&mut self) {
        if let Some(element) = self.options.pending_element() {
            let target = LoadingTarget::element(element);
            self.loading.remove(&target);
        }
        self.options.clear();
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Abort the in-flight request, keeping whatever streamed so far.
    pub fn cancel_stream(&mut self) -> bool {
        if !self.is_streaming() {
            return false;
        }
        self.finish_stream(StreamEnd::Cancelled);
        true
    }

    /// Drop the conversation. Thread and session ids are kept.
    ///
    /// Any in-flight request is aborted and pending `STOP_BLOCK_LOADING`
    /// commands are delivered immediately.
    pub fn reset_session(&mut self) {
        let mut stops: Vec<Vec<String>> = Vec::new();
        if let OperationState::Streaming(active) = std::mem::take(&mut self.state) {
            active.abort_handle.abort();
            tracing::info!(kind = active.kind.as_str(), "Aborted in-flight stream for reset");
            stops.extend(active.regenerating.into_values());
        }
        stops.extend(
            std::mem::take(&mut self.pending_stops)
                .into_iter()
                .map(|stop| stop.block_ids),
        );
        for block_ids in stops {
            self.dispatch_command(UiCommand::StopBlockLoading { block_ids });
        }

        self.transcript.clear();
        self.selection.clear();
        self.loading.clear();
        self.options.clear();
        self.follow_ups.clear();
        self.status = SessionStatus::Idle;
        tracing::info!("Session reset");
    }

    // ========================================================================
    // Driving
    // ========================================================================

    /// Apply buffered stream events, fire due timers and send a queued follow-up.
    ///
    /// Returns how many stream events were consumed.
    pub fn poll(&mut self) -> usize {
        let processed = self.process_stream_events();
        self.fire_due_stops(Instant::now());
        self.send_next_follow_up();
        processed
    }

    fn send_next_follow_up(&mut self) {
        if self.is_busy() {
            return;
        }
        let Some(FollowUp { text, element }) = self.follow_ups.pop_front() else {
            return;
        };
        let Ok(text) = NonEmptyString::new(text) else {
            tracing::warn!(%element, "Dropped empty option follow-up");
            return;
        };

        // The follow-up refers to the option's element. Whatever the user has
        // selected since then stays selected for their next message.
        let context = FrontendContext {
            selected_element: Some(element),
            selected_blocks: None,
        };
        let message_id = self.open_message(text, None, Some(context), None, Vec::new());
        tracing::debug!(message = message_id.value(), "Sent option follow-up");
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending_stops.iter().map(|stop| stop.due).min()
    }

    /// Wait for the next stream event or timer and apply it.
    ///
    /// Returns `false` once the session is settled.
    pub async fn wait_for_activity(&mut self) -> bool {
        let processed = self.poll();
        if self.is_settled() {
            return false;
        }
        if processed >= self.settings.event_budget.max(1) {
            // Budget exhausted with events still buffered.
            return true;
        }

        let deadline = self.next_deadline();
        let received = match &mut self.state {
            OperationState::Streaming(active) if active.has_held() => None,
            OperationState::Streaming(active) => match deadline {
                Some(deadline) => tokio::select! {
                    event = active.receiver.recv() => Some(event),
                    () = tokio::time::sleep_until(deadline) => None,
                },
                None => Some(active.receiver.recv().await),
            },
            OperationState::Idle => {
                if let Some(deadline) = deadline {
                    tokio::time::sleep_until(deadline).await;
                }
                None
            }
        };

        if let Some(event) = received {
            let event = event.unwrap_or_else(|| {
                tracing::warn!("Stream channel disconnected");
                StreamEvent::transport_error("stream disconnected")
            });
            self.handle_stream_event(event);
        }
        self.poll();
        true
    }

    /// Drive the session until nothing is in flight or pending.
    pub async fn run_until_settled(&mut self) {
        while self.wait_for_activity().await {}
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let OperationState::Streaming(active) = &self.state {
            active.abort_handle.abort();
        }
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("identity", &self.identity)
            .field("status", &self.status)
            .field("messages", &self.transcript.len())
            .field("selection", &self.selection)
            .field("loading", &self.loading)
            .field("streaming", &self.is_streaming())
            .field("pending_stops", &self.pending_stops.len())
            .field("follow_ups", &self.follow_ups.len())
            .finish_non_exhaustive()
    }
}
