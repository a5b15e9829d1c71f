use serde::{Deserialize, Serialize};

use crate::metadata::{path, Metadata, Value};
use crate::types::{Identifier, Timestamp};

/// One revision of a graph node.
///
/// Revisions are immutable once handed out by the store; a metadata update
/// produces a new revision with a higher `revision` number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier.
    #[serde(rename = "ID")]
    pub id: Identifier,
    /// Label of the host that reported the node.
    #[serde(rename = "Host", default)]
    pub host: String,
    /// Metadata document.
    #[serde(rename = "Metadata", default)]
    pub metadata: Metadata,
    /// Creation time.
    #[serde(rename = "CreatedAt", default)]
    pub created_at: Timestamp,
    /// Time of the mutation that produced this revision.
    #[serde(rename = "UpdatedAt", default)]
    pub updated_at: Timestamp,
    /// Deletion time; absent while the node is live.
    #[serde(rename = "DeletedAt", default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
    /// Revision counter, starting at 1 on creation.
    #[serde(rename = "Revision", default)]
    pub revision: u64,
}

impl Node {
    /// Value at a metadata dot path.
    pub fn get(&self, key: &str) -> Option<&Value> {
        path::lookup(&self.metadata, key)
    }

    /// String value at a metadata dot path.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Convenience accessor for the `Name` key.
    pub fn name(&self) -> Option<&str> {
        self.get_str("Name")
    }

    /// Convenience accessor for the `Type` key.
    pub fn node_type(&self) -> Option<&str> {
        self.get_str("Type")
    }

    /// Returns true while no deletion has been recorded for this revision.
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}
