//! Core engine for the canvas copilot - session state machine and orchestration.
//!
//! This crate owns the conversation: transcript, selection, loading targets,
//! option sets and the UI command bridge. It talks to the backend only through
//! [`StreamTransport`], and to the presentational layer only through
//! [`Bridge`] subscriptions and read accessors.

// Re-export from crates for public API
pub use canvas_transport::{self, StreamTransport};
pub use canvas_types::{
    BlockDetail, ContentBlock, ElementOption, EmptyStringError, FrontendContext, LoadingTarget,
    MessageId, NonEmptyString, Role, Selection, SessionId, SessionStatus, StreamEvent,
    StreamRequest, ThreadId, ToolStatus, UiCommand,
};

mod bridge;
mod errors;
mod identity;
mod ledger;
mod loading;
mod options;
mod selection;
mod session;
mod settings;
mod state;
mod streaming;
mod transcript;

pub use bridge::{Bridge, Subscription};
pub use errors::{STREAM_ERROR_BADGE, format_stream_error};
pub use identity::SessionIdentity;
pub use ledger::{LedgerChange, ToolCall, ToolCallKey, ToolCallLedger, ToolCallUpdate};
pub use loading::LoadingTargets;
pub use options::{AppliedOption, ElementOptionSet, OptionError, OptionPresentation};
pub use selection::SelectionModel;
pub use session::{AdContext, SendOutcome, SendRejection, SessionController};
pub use settings::SessionSettings;
pub use transcript::{ChatMessage, Transcript};
