use super::path;
use super::value::{Metadata, Value};

/// Operations for patching the metadata of a node or an edge.
#[derive(Clone, Debug, PartialEq)]
pub enum PatchOp {
    /// Set the value at a dot path.
    Set(String, Value),
    /// Delete the value at a dot path.
    Delete(String),
    /// Deep-merge a document: nested documents are merged key by key, any
    /// other value replaces the existing one.
    Merge(Metadata),
    /// Replace the whole document.
    Replace(Metadata),
}

/// A batch of metadata patch operations applied in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetadataPatch {
    /// The list of patch operations to apply.
    pub ops: Vec<PatchOp>,
}

impl MetadataPatch {
    /// Creates a new patch from a vector of operations.
    pub fn new(ops: Vec<PatchOp>) -> Self {
        Self { ops }
    }

    /// Patch setting a single dot path.
    pub fn set(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(vec![PatchOp::Set(path.into(), value.into())])
    }

    /// Patch deleting a single dot path.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(vec![PatchOp::Delete(path.into())])
    }

    /// Patch deep-merging a document.
    pub fn merge(doc: Metadata) -> Self {
        Self::new(vec![PatchOp::Merge(doc)])
    }

    /// Patch replacing the whole document.
    pub fn replace(doc: Metadata) -> Self {
        Self::new(vec![PatchOp::Replace(doc)])
    }

    /// Appends another operation.
    pub fn then(mut self, op: PatchOp) -> Self {
        self.ops.push(op);
        self
    }

    /// Returns true if this patch contains no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Applies the patch to a copy of `doc`. Returns `None` when the result
    /// is identical, so callers can skip recording no-op updates.
    pub fn apply(&self, doc: &Metadata) -> Option<Metadata> {
        let mut next = doc.clone();
        for op in &self.ops {
            match op {
                PatchOp::Set(p, value) => path::set(&mut next, p, value.clone()),
                PatchOp::Delete(p) => {
                    path::remove(&mut next, p);
                }
                PatchOp::Merge(other) => merge_into(&mut next, other),
                PatchOp::Replace(other) => next = other.clone(),
            }
        }
        (next != *doc).then_some(next)
    }
}

fn merge_into(target: &mut Metadata, other: &Metadata) {
    for (key, value) in other {
        match (target.get_mut(key), value) {
            (Some(Value::Map(existing)), Value::Map(incoming)) => merge_into(existing, incoming),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata;

    #[test]
    fn merge_is_deep() {
        let base: Metadata = serde_json::from_str(r#"{"Name":"lo","Ovs":{"UUID":"x","Port":1}}"#)
            .unwrap();
        let patch = MetadataPatch::merge(
            serde_json::from_str(r#"{"State":"UP","Ovs":{"Port":2}}"#).unwrap(),
        );
        let next = patch.apply(&base).unwrap();
        let ovs = next["Ovs"].as_map().unwrap();
        assert_eq!(ovs["UUID"], Value::from("x"));
        assert_eq!(ovs["Port"], Value::Int(2));
        assert_eq!(next["State"], Value::from("UP"));
    }

    #[test]
    fn identical_result_is_reported_as_noop() {
        let base = metadata! { "Name" => "lo" };
        assert!(MetadataPatch::set("Name", "lo").apply(&base).is_none());
        assert!(MetadataPatch::delete("Missing").apply(&base).is_none());
        assert!(MetadataPatch::set("Name", "lo2").apply(&base).is_some());
    }

    #[test]
    fn ops_apply_in_order() {
        let base = metadata! { "Name" => "lo", "MTU" => 65536 };
        let patch = MetadataPatch::replace(metadata! { "Name" => "eth0" })
            .then(PatchOp::Set("MTU".into(), Value::Int(1500)));
        let next = patch.apply(&base).unwrap();
        assert_eq!(next, metadata! { "Name" => "eth0", "MTU" => 1500 });
    }
}
