use serde::{Deserialize, Serialize};

use crate::metadata::{path, Metadata, Value};
use crate::types::{Identifier, Timestamp};

/// Metadata key carrying the relation type of an edge.
pub const RELATION_TYPE_KEY: &str = "RelationType";

/// One revision of a graph edge.
///
/// Endpoints are held by identifier only; resolving them goes through the
/// store or a projection, so an edge never keeps a node alive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Edge identifier.
    #[serde(rename = "ID")]
    pub id: Identifier,
    /// Parent (source) node identifier.
    #[serde(rename = "Parent")]
    pub parent: Identifier,
    /// Child (target) node identifier.
    #[serde(rename = "Child")]
    pub child: Identifier,
    /// Label of the host that reported the edge.
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
    /// Deletion time; absent while the edge is live.
    #[serde(rename = "DeletedAt", default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
    /// Revision counter, starting at 1 on creation.
    #[serde(rename = "Revision", default)]
    pub revision: u64,
}

impl Edge {
    /// Value at a metadata dot path.
    pub fn get(&self, key: &str) -> Option<&Value> {
        path::lookup(&self.metadata, key)
    }

    /// The `RelationType` metadata value, if any.
    pub fn relation_type(&self) -> Option<&str> {
        self.get(RELATION_TYPE_KEY).and_then(Value::as_str)
    }

    /// Returns true when `node` is one of the endpoints.
    pub fn touches(&self, node: &Identifier) -> bool {
        &self.parent == node || &self.child == node
    }
}
