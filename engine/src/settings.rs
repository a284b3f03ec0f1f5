use std::time::Duration;

use canvas_config::SessionConfig;

pub(crate) const DEFAULT_GRACE_DELAY: Duration = Duration::from_millis(500);
pub(crate) const DEFAULT_REGENERATE_TOOLS: &[&str] =
    &["regenerate_script", "regenerate_scene", "regenerate_blocks"];
pub(crate) const DEFAULT_INITIALIZE_PROMPT: &str =
    "Analyze this ad and draft a creative brief I can iterate on.";
/// Upper bound on stream events handled per drain.
pub(crate) const DEFAULT_EVENT_BUDGET: usize = 512;

/// Tunables for a [`SessionController`](crate::SessionController).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Delay between a regenerate tool finishing and `STOP_BLOCK_LOADING`.
    pub grace_delay: Duration,
    pub regenerate_tools: Vec<String>,
    pub initialize_prompt: String,
    pub event_budget: usize,
}

impl SessionSettings {
    #[must_use]
    pub fn from_config(config: Option<&SessionConfig>) -> Self {
        let mut settings = Self::default();
        let Some(config) = config else {
            return settings;
        };

        if let Some(ms) = config.grace_delay_ms {
            settings.grace_delay = Duration::from_millis(ms);
        }
        if let Some(tools) = &config.regenerate_tools {
            settings.regenerate_tools = tools
                .iter()
                .map(|tool| tool.trim().to_string())
                .filter(|tool| !tool.is_empty())
                .collect();
        }
        if let Some(prompt) = config
            .initialize_prompt
            .as_deref()
            .map(str::trim)
            .filter(|prompt| !prompt.is_empty())
        {
            settings.initialize_prompt = prompt.to_string();
        }
        settings
    }

    #[must_use]
    pub fn is_regenerate_tool(&self, tool: &str) -> bool {
        self.regenerate_tools.iter().any(|name| name == tool)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            grace_delay: DEFAULT_GRACE_DELAY,
            regenerate_tools: DEFAULT_REGENERATE_TOOLS
                .iter()
                .map(|tool| (*tool).to_string())
                .collect(),
            initialize_prompt: DEFAULT_INITIALIZE_PROMPT.to_string(),
            event_budget: DEFAULT_EVENT_BUDGET,
        }
    }
}
