//! Collaborator data the session consumes but does not own.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ad detail as returned by the audit service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdDetail {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub analysis: Value,
    #[serde(default)]
    pub metrics: Value,
}

impl AdDetail {
    /// Seed payload for session initialization.
    #[must_use]
    pub fn brief_data(&self) -> Value {
        serde_json::json!({
            "ad_id": self.id,
            "ad_name": self.name,
            "analysis": self.analysis,
            "metrics": self.metrics,
        })
    }
}

/// One creative in an ad account listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreativeSummary {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}
