//! Configuration for the canvas copilot.
//!
//! Read from `~/.canvas/config.toml`. Every table is optional; callers fall back to
//! their own defaults for anything missing.
//!
//! ```toml
//! [backend]
//! url = "https://copilot.example.com/api/chat/stream"
//! catalog_url = "https://copilot.example.com/api"
//! api_key = "${CANVAS_API_KEY}"
//! idle_timeout_secs = 300
//!
//! [session]
//! grace_delay_ms = 500
//! regenerate_tools = ["regenerate_script", "regenerate_scene"]
//! ```

use serde::Deserialize;
use std::{
    env,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Overrides `[backend] url` when set.
pub const BACKEND_URL_ENV: &str = "CANVAS_BACKEND_URL";

#[derive(Debug, Default, Deserialize)]
pub struct CanvasConfig {
    pub backend: Option<BackendConfig>,
    pub session: Option<SessionConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Default, Deserialize)]
pub struct BackendConfig {
    /// Streaming chat endpoint.
    pub url: Option<String>,
    /// Base URL for ad and account lookups.
    pub catalog_url: Option<String>,
    /// Bearer token. Supports `${ENV_VAR}` references.
    pub api_key: Option<String>,
    /// Seconds without a stream chunk before the stream is failed. `0` disables.
    pub idle_timeout_secs: Option<u64>,
}

// Manual Debug impl to prevent leaking the API key in logs.
impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("catalog_url", &self.catalog_url)
            .field(
                "api_key",
                &if self.api_key.is_some() {
                    "[REDACTED]"
                } else {
                    "None"
                },
            )
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .finish()
    }
}

impl BackendConfig {
    /// Endpoint URL after env override and `${VAR}` expansion.
    #[must_use]
    pub fn resolved_url(&self) -> Option<String> {
        if let Ok(url) = env::var(BACKEND_URL_ENV)
            && !url.trim().is_empty()
        {
            return Some(url);
        }
        self.url
            .as_deref()
            .map(expand_env_vars)
            .filter(|url| !url.trim().is_empty())
    }

    #[must_use]
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .map(expand_env_vars)
            .filter(|key| !key.trim().is_empty())
    }

    #[must_use]
    pub fn resolved_catalog_url(&self) -> Option<String> {
        self.catalog_url
            .as_deref()
            .map(expand_env_vars)
            .filter(|url| !url.trim().is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    /// Delay between a regenerate tool finishing and `STOP_BLOCK_LOADING`.
    pub grace_delay_ms: Option<u64>,
    /// Tool names that put the selected blocks into a loading state.
    pub regenerate_tools: Option<Vec<String>>,
    /// Text sent with the bootstrap request of `initialize_session`.
    pub initialize_prompt: Option<String>,
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(end_rel) = rest[start + 2..].find('}') else {
            break;
        };
        let end = start + 2 + end_rel;
        let var = &rest[start + 2..end];
        out.push_str(&rest[..start]);
        if var.is_empty() {
            out.push_str("${}");
        } else {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[end + 1..];
    }

    out.push_str(rest);
    out
}

impl CanvasConfig {
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    /// Load from an explicit path. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".canvas").join("config.toml"))
}
