//! AI-offered choices for one element and the user's pick.

use canvas_types::{ElementOption, MessageId};
use thiserror::Error;

/// The option set currently on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementOptionSet {
    pub options: Vec<ElementOption>,
    pub element: String,
    /// AI message that offered the options.
    pub message_id: MessageId,
    pub selected_option_id: Option<String>,
}

impl ElementOptionSet {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.selected_option_id.is_some()
    }
}

/// Delivered to subscribers when the user picks an option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedOption {
    pub element: String,
    pub option_id: String,
    pub value: String,
    /// 1-based position within the offered set.
    pub position: usize,
    /// Message the session sends on the user's behalf.
    pub follow_up: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionError {
    #[error("no options are being offered")]
    NoOptions,
    #[error("option '{0}' is not part of the offered set")]
    UnknownOption(String),
    #[error("an option was already chosen for '{element}'")]
    AlreadyResolved { element: String },
}

#[derive(Debug, Default)]
pub struct OptionPresentation {
    current: Option<ElementOptionSet>,
}

impl OptionPresentation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a new set, superseding any previous one.
    pub fn present(&mut self, options: Vec<ElementOption>, element: String, message_id: MessageId) {
        self.current = Some(ElementOptionSet {
            options,
            element,
            message_id,
            selected_option_id: None,
        });
    }

    /// Record the user's choice. `label` is echoed back in the follow-up text;
    /// a blank label falls back to the option's own label.
    pub fn resolve(&mut self, option_id: &str, label: &str) -> Result<AppliedOption, OptionError> {
        let set = self.current.as_mut().ok_or(OptionError::NoOptions)?;
        if set.is_resolved() {
            return Err(OptionError::AlreadyResolved {
                element: set.element.clone(),
            });
        }
        let (index, option) = set
            .options
            .iter()
            .enumerate()
            .find(|(_, option)| option.id == option_id)
            .ok_or_else(|| OptionError::UnknownOption(option_id.to_owned()))?;

        let position = index + 1;
        let label = if label.trim().is_empty() {
            option.label.as_str()
        } else {
            label
        };
        let applied = AppliedOption {
            element: set.element.clone(),
            option_id: option.id.clone(),
            value: option.value.clone(),
            position,
            follow_up: format!("Option {position} - {label}"),
        };
        set.selected_option_id = Some(option_id.to_owned());
        Ok(applied)
    }

    /// Element awaiting a choice, if any.
    #[must_use]
    pub fn pending_element(&self) -> Option<&str> {
        self.current
            .as_ref()
            .filter(|set| !set.is_resolved())
            .map(|set| set.element.as_str())
    }

    #[must_use]
    pub fn current(&self) -> Option<&ElementOptionSet> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
