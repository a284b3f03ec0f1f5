use std::fmt;

use serde::{Deserialize, Serialize};

/// Scene-level description of a selected content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDetail {
    pub id: String,
    pub scene_number: u32,
    pub script: String,
    pub visual: String,
}

/// The subject of the next message: one on-screen element or a set of blocks.
///
/// The two kinds are mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Selection {
    Element {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Blocks {
        ids: Vec<String>,
        #[serde(default)]
        details: Vec<BlockDetail>,
    },
}

impl Selection {
    #[must_use]
    pub fn element_key(&self) -> Option<&str> {
        match self {
            Selection::Element { key, .. } => Some(key),
            Selection::Blocks { .. } => None,
        }
    }

    #[must_use]
    pub fn block_ids(&self) -> &[String] {
        match self {
            Selection::Blocks { ids, .. } => ids,
            Selection::Element { .. } => &[],
        }
    }
}

/// Opaque busy key: `element-<key>` or `block-<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadingTarget(String);

impl LoadingTarget {
    const ELEMENT_PREFIX: &'static str = "element-";
    const BLOCK_PREFIX: &'static str = "block-";

    pub fn element(key: impl AsRef<str>) -> Self {
        Self(format!("{}{}", Self::ELEMENT_PREFIX, key.as_ref()))
    }

    pub fn block(id: impl AsRef<str>) -> Self {
        Self(format!("{}{}", Self::BLOCK_PREFIX, id.as_ref()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_block(&self) -> bool {
        self.0.starts_with(Self::BLOCK_PREFIX)
    }

    #[must_use]
    pub fn is_element(&self) -> bool {
        self.0.starts_with(Self::ELEMENT_PREFIX)
    }
}

impl fmt::Display for LoadingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
