//! Inbound change records.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One write in a change batch.
///
/// `value: None` is the ABSENT marker and deletes the key at `path`.
/// In JSON a missing `value` member means ABSENT, while `"value": null`
/// stores a null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Segments from the document root to the written key.
    pub path: Vec<String>,
    /// New value, or `None` to delete.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
}

impl Change {
    /// Creates a change that stores `value` at `path`.
    pub fn set<I, S>(path: I, value: impl Into<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: super::path(path),
            value: Some(value.into()),
        }
    }

    /// Creates a change that deletes the key at `path`.
    pub fn remove<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: super::path(path),
            value: None,
        }
    }

    /// Returns true if this change deletes its key.
    pub fn is_removal(&self) -> bool {
        self.value.is_none()
    }
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
