//! Backend-originated UI commands.
//!
//! The vocabulary is open-ended: commands the session understands are decoded into
//! typed variants, everything else is carried through untouched as [`UiCommand::Custom`]
//! so the presentational layer can still act on it.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const START_BLOCK_LOADING: &str = "START_BLOCK_LOADING";
pub const STOP_BLOCK_LOADING: &str = "STOP_BLOCK_LOADING";
pub const UPDATE_BLOCKS: &str = "UPDATE_BLOCKS";
pub const UPDATE_FIELD: &str = "UPDATE_FIELD";
/// Name given to a command object that arrived without one.
pub const UNNAMED_COMMAND: &str = "UNNAMED";

/// A content block of the creative brief (a scene, a script line, ...).
///
/// Only `id` is interpreted; the remaining fields belong to the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(deserialize_with = "block_id")]
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ContentBlock {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawUiCommand", into = "RawUiCommand")]
pub enum UiCommand {
    /// Show skeletons for the listed blocks (empty list: the whole brief).
    StartBlockLoading { block_ids: Vec<String> },
    StopBlockLoading { block_ids: Vec<String> },
    /// Replace blocks. With `selective`, only the listed blocks change.
    UpdateBlocks {
        blocks: Vec<ContentBlock>,
        selective: bool,
    },
    /// Set one named field of the brief (headline, hook, cta...).
    UpdateField { field: String, value: Value },
    /// Any command this crate does not interpret.
    Custom {
        name: String,
        fields: Map<String, Value>,
    },
}

impl UiCommand {
    /// Carry a command object through untouched as [`UiCommand::Custom`].
    ///
    /// Used for commands that fail typed decoding. The name is taken from
    /// `type` (or `command`) when it is a non-blank string.
    #[must_use]
    pub fn opaque(value: Value) -> Self {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => {
                let mut fields = Map::new();
                fields.insert("value".to_string(), other);
                fields
            }
        };
        let name_key = ["type", "command"].into_iter().find(|key| {
            fields
                .get(*key)
                .and_then(Value::as_str)
                .is_some_and(|name| !name.trim().is_empty())
        });
        let name = match name_key.and_then(|key| fields.remove(key)) {
            Some(Value::String(name)) => name,
            _ => {
                // Keep an unusable `type` from clashing with the name on the way out.
                if let Some(raw) = fields.remove("type") {
                    fields.insert("raw_type".to_string(), raw);
                }
                UNNAMED_COMMAND.to_string()
            }
        };
        UiCommand::Custom { name, fields }
    }

    /// Typed decoding. On failure the error comes back with the
    /// [`UiCommand::opaque`] fallback.
    pub fn from_value(value: Value) -> Result<Self, (Self, serde_json::Error)> {
        serde_json::from_value(value.clone()).map_err(|e| (Self::opaque(value), e))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            UiCommand::StartBlockLoading { .. } => START_BLOCK_LOADING,
            UiCommand::StopBlockLoading { .. } => STOP_BLOCK_LOADING,
            UiCommand::UpdateBlocks { .. } => UPDATE_BLOCKS,
            UiCommand::UpdateField { .. } => UPDATE_FIELD,
            UiCommand::Custom { name, .. } => name,
        }
    }
}

#[derive(Debug, Error)]
pub enum UiCommandError {
    #[error("UI command is missing its name")]
    MissingName,
    #[error("malformed {name} command: {source}")]
    Malformed {
        name: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawUiCommand {
    #[serde(rename = "type", alias = "command")]
    name: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

#[derive(Deserialize)]
struct BlockIdsPayload {
    #[serde(default, alias = "blockIds", deserialize_with = "block_ids")]
    block_ids: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBlockId {
    Text(String),
    Number(serde_json::Number),
}

impl From<RawBlockId> for String {
    fn from(id: RawBlockId) -> Self {
        match id {
            RawBlockId::Text(id) => id,
            RawBlockId::Number(id) => id.to_string(),
        }
    }
}

/// Block ids arrive as strings or as bare numbers.
fn block_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    RawBlockId::deserialize(deserializer).map(String::from)
}

fn block_ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let ids = Vec::<RawBlockId>::deserialize(deserializer)?;
    Ok(ids.into_iter().map(String::from).collect())
}

/// Decode a command list element by element.
///
/// One undecodable command does not cost the others: it is carried as
/// [`UiCommand::opaque`].
pub(crate) fn lenient_commands<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<UiCommand>, D::Error> {
    let values = match Value::deserialize(deserializer)? {
        Value::Array(values) => values,
        other => {
            return Err(serde::de::Error::custom(format!(
                "expected a command list, got {other}"
            )));
        }
    };
    Ok(values
        .into_iter()
        .map(|value| UiCommand::from_value(value).unwrap_or_else(|(command, _)| command))
        .collect())
}

#[derive(Deserialize)]
struct UpdateBlocksPayload {
    blocks: Vec<ContentBlock>,
    #[serde(default)]
    selective: bool,
}

#[derive(Deserialize)]
struct UpdateFieldPayload {
    field: String,
    #[serde(default)]
    value: Value,
}

fn decode<T: serde::de::DeserializeOwned>(
    name: &str,
    fields: Map<String, Value>,
) -> Result<T, UiCommandError> {
    serde_json::from_value(Value::Object(fields)).map_err(|source| UiCommandError::Malformed {
        name: name.to_string(),
        source,
    })
}

impl TryFrom<RawUiCommand> for UiCommand {
    type Error = UiCommandError;

    fn try_from(raw: RawUiCommand) -> Result<Self, Self::Error> {
        let RawUiCommand { name, fields } = raw;
        if name.trim().is_empty() {
            return Err(UiCommandError::MissingName);
        }
        let command = match name.as_str() {
            START_BLOCK_LOADING => UiCommand::StartBlockLoading {
                block_ids: decode::<BlockIdsPayload>(&name, fields)?.block_ids,
            },
            STOP_BLOCK_LOADING => UiCommand::StopBlockLoading {
                block_ids: decode::<BlockIdsPayload>(&name, fields)?.block_ids,
            },
            UPDATE_BLOCKS => {
                let payload: UpdateBlocksPayload = decode(&name, fields)?;
                UiCommand::UpdateBlocks {
                    blocks: payload.blocks,
                    selective: payload.selective,
                }
            }
            UPDATE_FIELD => {
                let payload: UpdateFieldPayload = decode(&name, fields)?;
                UiCommand::UpdateField {
                    field: payload.field,
                    value: payload.value,
                }
            }
            _ => UiCommand::Custom { name, fields },
        };
        Ok(command)
    }
}

impl From<UiCommand> for RawUiCommand {
    fn from(command: UiCommand) -> Self {
        let name = command.name().to_string();
        let mut fields = Map::new();
        match command {
            UiCommand::StartBlockLoading { block_ids } | UiCommand::StopBlockLoading { block_ids } => {
                fields.insert("block_ids".to_string(), Value::from(block_ids));
            }
            UiCommand::UpdateBlocks { blocks, selective } => {
                let blocks = serde_json::to_value(blocks).unwrap_or(Value::Array(Vec::new()));
                fields.insert("blocks".to_string(), blocks);
                fields.insert("selective".to_string(), Value::Bool(selective));
            }
            UiCommand::UpdateField { field, value } => {
                fields.insert("field".to_string(), Value::String(field));
                fields.insert("value".to_string(), value);
            }
            UiCommand::Custom { fields: custom, .. } => fields = custom,
        }
        RawUiCommand { name, fields }
    }
}
