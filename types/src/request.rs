use serde::{Deserialize, Serialize};

use crate::ids::{SessionId, ThreadId};
use crate::selection::{BlockDetail, Selection};

/// Scene summary sent for each selected block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedBlockContext {
    pub scene_number: u32,
    pub script: String,
    pub visual: String,
}

impl From<&BlockDetail> for SelectedBlockContext {
    fn from(detail: &BlockDetail) -> Self {
        Self {
            scene_number: detail.scene_number,
            script: detail.script.clone(),
            visual: detail.visual.clone(),
        }
    }
}

/// Structured snapshot of the current selection, sent so the agent can resolve
/// "this", "here", "make it punchier" and similar references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_element: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_blocks: Option<Vec<SelectedBlockContext>>,
}

impl FrontendContext {
    /// Context derived from a selection, or `None` when it carries nothing useful.
    #[must_use]
    pub fn from_selection(selection: &Selection) -> Option<Self> {
        match selection {
            Selection::Element { key, .. } => Some(Self {
                selected_element: Some(key.clone()),
                selected_blocks: None,
            }),
            Selection::Blocks { details, .. } if !details.is_empty() => Some(Self {
                selected_element: None,
                selected_blocks: Some(details.iter().map(SelectedBlockContext::from).collect()),
            }),
            Selection::Blocks { .. } => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected_element.is_none()
            && self.selected_blocks.as_ref().is_none_or(Vec::is_empty)
    }
}

/// Body of one streaming request to the copilot backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub message: String,
    pub thread_id: ThreadId,
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_ad_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_context: Option<FrontendContext>,
    /// One-time brief seed, only sent by session initialization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brief_data: Option<serde_json::Value>,
    pub stream: bool,
}

impl StreamRequest {
    pub fn new(message: impl Into<String>, thread_id: ThreadId, session_id: SessionId) -> Self {
        Self {
            message: message.into(),
            thread_id,
            session_id,
            audit_ad_id: None,
            ad_account_id: None,
            frontend_context: None,
            brief_data: None,
            stream: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FrontendContext, StreamRequest};
    use crate::{BlockDetail, Selection, SessionId, ThreadId};
    use serde_json::json;

    #[test]
    fn request_omits_absent_fields() {
        let request = StreamRequest::new(
            "Make the hook punchier",
            ThreadId::from("thread_1".to_string()),
            SessionId::from("session_1".to_string()),
        );
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "message": "Make the hook punchier",
                "thread_id": "thread_1",
                "session_id": "session_1",
                "stream": true
            })
        );
    }

    #[test]
    fn context_from_element_selection() {
        let selection = Selection::Element {
            key: "hook".to_string(),
            label: Some("Hook".to_string()),
        };
        let context = FrontendContext::from_selection(&selection).unwrap();
        assert_eq!(
            serde_json::to_value(&context).unwrap(),
            json!({"selected_element": "hook"})
        );
    }

    #[test]
    fn context_from_block_details() {
        let selection = Selection::Blocks {
            ids: vec!["b1".to_string()],
            details: vec![BlockDetail {
                id: "b1".to_string(),
                scene_number: 2,
                script: "Open on the beach".to_string(),
                visual: "Drone shot".to_string(),
            }],
        };
        let context = FrontendContext::from_selection(&selection).unwrap();
        assert_eq!(
            serde_json::to_value(&context).unwrap(),
            json!({"selected_blocks": [
                {"scene_number": 2, "script": "Open on the beach", "visual": "Drone shot"}
            ]})
        );
    }

    #[test]
    fn blocks_without_details_produce_no_context() {
        let selection = Selection::Blocks {
            ids: vec!["b1".to_string()],
            details: Vec::new(),
        };
        assert!(FrontendContext::from_selection(&selection).is_none());
        assert!(FrontendContext::default().is_empty());
    }
}
