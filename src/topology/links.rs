use std::sync::Arc;

use tracing::debug;

use crate::metadata::{Metadata, Value};
use crate::storage::{Edge, GraphView, GraphWriter, Node, RELATION_TYPE_KEY};
use crate::types::{Identifier, Result};

/// Relation type of a containment link (host owns namespace, bridge owns
/// port, ...).
pub const OWNERSHIP: &str = "ownership";

/// Relation type of a layer-2 adjacency (port to interface, veth peers,
/// patch ports).
pub const LAYER2: &str = "layer2";

/// Node `Type` value of host nodes.
pub const HOST_TYPE: &str = "host";

/// Live link of `relation` from `parent` to `child`, if any.
pub fn find_link(
    view: &dyn GraphView,
    parent: &Identifier,
    child: &Identifier,
    relation: &str,
) -> Option<Arc<Edge>> {
    view.out_edges(parent)
        .into_iter()
        .find(|e| &e.child == child && e.relation_type() == Some(relation))
}

/// Links `parent` to `child` with the given relation type, merged over
/// `extra`. Returns the existing live link when there already is one.
pub fn add_link(
    writer: &mut GraphWriter<'_>,
    parent: &Node,
    child: &Node,
    relation: &str,
    extra: Metadata,
) -> Result<Arc<Edge>> {
    if let Some(existing) = find_link(writer.view(), &parent.id, &child.id, relation) {
        return Ok(existing);
    }
    let mut metadata = extra;
    metadata.insert(RELATION_TYPE_KEY.to_owned(), Value::from(relation));
    debug!(parent = %parent.id, child = %child.id, relation, "topology.link");
    writer.new_edge(Identifier::generate(), &parent.id, &child.id, metadata)
}

/// Adds an ownership link from `parent` to `child`.
pub fn add_ownership_link(
    writer: &mut GraphWriter<'_>,
    parent: &Node,
    child: &Node,
    extra: Metadata,
) -> Result<Arc<Edge>> {
    add_link(writer, parent, child, OWNERSHIP, extra)
}

/// Adds a layer-2 link from `parent` to `child`.
pub fn add_layer2_link(
    writer: &mut GraphWriter<'_>,
    parent: &Node,
    child: &Node,
    extra: Metadata,
) -> Result<Arc<Edge>> {
    add_link(writer, parent, child, LAYER2, extra)
}

/// Returns true if `child` already has an ownership parent.
pub fn has_owner(view: &dyn GraphView, child: &Identifier) -> bool {
    owner(view, child).is_some()
}

/// Ownership parent of `child`.
pub fn owner(view: &dyn GraphView, child: &Identifier) -> Option<Arc<Node>> {
    view.in_edges(child)
        .into_iter()
        .find(|e| e.relation_type() == Some(OWNERSHIP))
        .and_then(|e| view.node_revisions(&e.parent).pop())
}

/// Returns the live host node named `name`, creating it when missing.
pub fn ensure_host(writer: &mut GraphWriter<'_>, name: &str, extra: Metadata) -> Result<Arc<Node>> {
    let existing = writer.view().nodes().into_iter().find(|n| {
        n.node_type() == Some(HOST_TYPE) && n.name() == Some(name)
    });
    if let Some(host) = existing {
        return Ok(host);
    }
    let mut metadata = extra;
    metadata.insert("Type".to_owned(), Value::from(HOST_TYPE));
    metadata.insert("Name".to_owned(), Value::from(name));
    writer.new_node(Identifier::generate(), name, metadata)
}
