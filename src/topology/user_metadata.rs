//! Operator-supplied metadata overlaid on the nodes a query selects.
//!
//! A rule `(query, key, value)` writes `UserMetadata.<key> = value` on every
//! node the query selects. Removing the rule deletes the key again.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::metadata::{path, MetadataPatch, Value};
use crate::query::TraversalEngine;
use crate::types::{Identifier, Result, TopoError};

/// Root key of the overlay inside node metadata.
pub const USER_METADATA_KEY: &str = "UserMetadata";

/// One overlay rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserMetadataRule {
    /// Query selecting the nodes to decorate.
    pub gremlin_query: String,
    /// Key written under `UserMetadata`.
    pub key: String,
    /// Value written.
    pub value: Value,
}

impl UserMetadataRule {
    /// Creates a rule.
    pub fn new(query: impl Into<String>, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            gremlin_query: query.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    /// Full metadata path the rule writes.
    pub fn path(&self) -> String {
        format!("{USER_METADATA_KEY}.{}", self.key)
    }
}

/// Keeps the registered rules and applies them through the engine.
///
/// A rule is evaluated when it is added and on every [`reapply`] call, not
/// on graph mutations: nodes created or changed afterwards only pick a rule
/// up at the next `reapply`. Callers that need the overlay to track the
/// graph call `reapply` after their batches.
///
/// [`reapply`]: UserMetadataManager::reapply
pub struct UserMetadataManager {
    engine: Arc<TraversalEngine>,
    rules: Mutex<BTreeMap<String, UserMetadataRule>>,
}

impl UserMetadataManager {
    /// Creates a manager with no rules.
    pub fn new(engine: Arc<TraversalEngine>) -> Self {
        Self {
            engine,
            rules: Mutex::new(BTreeMap::new()),
        }
    }

    /// Registers `rule` under `name` and applies it. Returns the nodes that
    /// were decorated.
    pub fn add_rule(&self, name: impl Into<String>, rule: UserMetadataRule) -> Result<Vec<Identifier>> {
        let name = name.into();
        crate::query::parse(&rule.gremlin_query)?;
        let applied = self.apply(&rule)?;
        debug!(rule = %name, nodes = applied.len(), "user_metadata.added");
        self.rules.lock().insert(name, rule);
        Ok(applied)
    }

    /// Unregisters a rule and removes its key from the nodes it currently
    /// selects. Unknown names are ignored.
    pub fn remove_rule(&self, name: &str) -> Result<Vec<Identifier>> {
        let Some(rule) = self.rules.lock().remove(name) else {
            return Ok(Vec::new());
        };
        let targets = self.targets(&rule)?;
        let key = rule.path();
        let patch = MetadataPatch::delete(key.as_str());
        let mut removed = Vec::new();
        let mut writer = self.engine.graph().write();
        for id in targets {
            let carries = writer
                .get_node(&id)
                .is_some_and(|n| path::contains(&n.metadata, &key));
            if carries {
                settle(writer.update_node_metadata(&id, &patch))?;
                removed.push(id);
            }
        }
        debug!(rule = %name, nodes = removed.len(), "user_metadata.removed");
        Ok(removed)
    }

    /// Re-applies every rule; nodes created since a rule was added pick it
    /// up here.
    pub fn reapply(&self) -> Result<usize> {
        let rules: Vec<_> = self.rules.lock().values().cloned().collect();
        let mut total = 0;
        for rule in &rules {
            total += self.apply(rule)?.len();
        }
        Ok(total)
    }

    /// Registered rules by name.
    pub fn rules(&self) -> BTreeMap<String, UserMetadataRule> {
        self.rules.lock().clone()
    }

    fn targets(&self, rule: &UserMetadataRule) -> Result<Vec<Identifier>> {
        let mut seen = FxHashSet::default();
        Ok(self
            .engine
            .get_nodes(&rule.gremlin_query)?
            .into_iter()
            .filter(|n| seen.insert(n.id.clone()))
            .map(|n| n.id.clone())
            .collect())
    }

    fn apply(&self, rule: &UserMetadataRule) -> Result<Vec<Identifier>> {
        let targets = self.targets(rule)?;
        let patch = MetadataPatch::set(rule.path(), rule.value.clone());
        let mut applied = Vec::new();
        let mut writer = self.engine.graph().write();
        for id in targets {
            // The node may have gone between the query and the write lock.
            if writer.get_node(&id).is_none() {
                continue;
            }
            settle(writer.update_node_metadata(&id, &patch))?;
            applied.push(id);
        }
        Ok(applied)
    }
}

/// Listener failures do not undo the overlay; they are logged and the
/// overlay proceeds.
fn settle<T>(result: Result<T>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(TopoError::ListenerFailed { id, failures, .. }) => {
            warn!(%id, ?failures, "user_metadata.listener_failed");
            Ok(())
        }
        Err(err) => Err(err),
    }
}
