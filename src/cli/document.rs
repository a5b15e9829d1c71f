//! JSON topology documents: the interchange format of the `topograph`
//! binary.
//!
//! ```json
//! {
//!   "nodes":   [{"id": "n1", "host": "h1", "metadata": {"Type": "host"}}],
//!   "edges":   [{"id": "e1", "parent": "n1", "child": "n2", "metadata": {}}],
//!   "metrics": {"n2": [{"Start": 0, "Last": 1000, "TxPackets": 2}]}
//! }
//! ```
//!
//! Loading replays the document through the ordinary mutation API under a
//! single write lock, so listeners and history see it like any other batch.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::metadata::Metadata;
use crate::series::{InterfaceMetric, MetricStore};
use crate::storage::{Graph, GraphView};
use crate::types::{Identifier, Result};

/// Node entry of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDoc {
    /// Node identifier.
    pub id: Identifier,
    /// Host label; empty means the graph's default host.
    #[serde(default)]
    pub host: String,
    /// Node metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

/// Edge entry of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDoc {
    /// Edge identifier; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Identifier>,
    /// Parent node.
    pub parent: Identifier,
    /// Child node.
    pub child: Identifier,
    /// Edge metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

/// Whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyDocument {
    /// Nodes, created in order.
    #[serde(default)]
    pub nodes: Vec<NodeDoc>,
    /// Edges, created after every node.
    #[serde(default)]
    pub edges: Vec<EdgeDoc>,
    /// Interface metric records keyed by node identifier.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<Identifier, Vec<InterfaceMetric>>,
}

/// Counts of what a load created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Nodes created.
    pub nodes: usize,
    /// Edges created.
    pub edges: usize,
    /// Metric records appended.
    pub metrics: usize,
}

impl TopologyDocument {
    /// Parses a document from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads and parses a document file.
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let doc = Self::from_json(&text)?;
        debug!(
            path = %path.display(),
            nodes = doc.nodes.len(),
            edges = doc.edges.len(),
            "document.read"
        );
        Ok(doc)
    }

    /// Snapshot of the live graph plus every stored metric series.
    pub fn capture(graph: &Graph, store: &MetricStore) -> Self {
        let reader = graph.read();
        let view: &dyn GraphView = &*reader;
        let nodes: Vec<NodeDoc> = view
            .nodes()
            .into_iter()
            .map(|n| NodeDoc {
                id: n.id.clone(),
                host: n.host.clone(),
                metadata: n.metadata.clone(),
            })
            .collect();
        let metrics = nodes
            .iter()
            .filter_map(|n| {
                let records = store.records(&n.id);
                (!records.is_empty()).then(|| (n.id.clone(), records))
            })
            .collect();
        let edges = view
            .edges()
            .into_iter()
            .map(|e| EdgeDoc {
                id: Some(e.id.clone()),
                parent: e.parent.clone(),
                child: e.child.clone(),
                metadata: e.metadata.clone(),
            })
            .collect();
        Self {
            nodes,
            edges,
            metrics,
        }
    }

    /// Serializes to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Replays the document into `graph` and `store`.
    pub fn load_into(&self, graph: &Arc<Graph>, store: &MetricStore) -> Result<LoadSummary> {
        let mut summary = LoadSummary::default();
        {
            let mut writer = graph.write();
            for node in &self.nodes {
                writer.new_node(node.id.clone(), &node.host, node.metadata.clone())?;
                summary.nodes += 1;
            }
            for edge in &self.edges {
                let id = edge.id.clone().unwrap_or_else(Identifier::generate);
                writer.new_edge(id, &edge.parent, &edge.child, edge.metadata.clone())?;
                summary.edges += 1;
            }
        }
        for (node, records) in &self.metrics {
            for record in records {
                store.append(node, record.clone())?;
                summary.metrics += 1;
            }
        }
        info!(
            nodes = summary.nodes,
            edges = summary.edges,
            metrics = summary.metrics,
            "document.loaded"
        );
        Ok(summary)
    }
}
