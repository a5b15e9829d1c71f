//! Dot-path addressing into metadata documents.
//!
//! Keys may themselves contain dots (container labels such as `a.b.c` are
//! stored verbatim by some collectors), so resolution prefers the longest key
//! that exists at each level before descending.

use super::value::{Metadata, Value};

/// Resolves `path` to a single value, without fanning out through sequences.
pub fn lookup<'a>(doc: &'a Metadata, path: &str) -> Option<&'a Value> {
    if let Some(value) = doc.get(path) {
        return Some(value);
    }
    for (idx, _) in path.rmatch_indices('.') {
        let (head, rest) = (&path[..idx], &path[idx + 1..]);
        if let Some(Value::Map(inner)) = doc.get(head) {
            if let Some(found) = lookup(inner, rest) {
                return Some(found);
            }
        }
    }
    None
}

/// Resolves `path` to every value it designates. Sequences of documents on
/// the way are fanned out, so `Routes.Prefix` yields the prefix of every
/// route.
pub fn collect<'a>(doc: &'a Metadata, path: &str) -> Vec<&'a Value> {
    let mut out = Vec::new();
    collect_into(doc, path, &mut out);
    out
}

fn collect_into<'a>(doc: &'a Metadata, path: &str, out: &mut Vec<&'a Value>) {
    if let Some(value) = doc.get(path) {
        out.push(value);
        return;
    }
    for (idx, _) in path.rmatch_indices('.') {
        let (head, rest) = (&path[..idx], &path[idx + 1..]);
        match doc.get(head) {
            Some(Value::Map(inner)) => {
                let before = out.len();
                collect_into(inner, rest, out);
                if out.len() > before {
                    return;
                }
            }
            Some(Value::List(items)) => {
                let before = out.len();
                for item in items {
                    if let Value::Map(inner) = item {
                        collect_into(inner, rest, out);
                    }
                }
                if out.len() > before {
                    return;
                }
            }
            _ => {}
        }
    }
}

/// Returns true if `path` designates at least one value.
pub fn contains(doc: &Metadata, path: &str) -> bool {
    !collect(doc, path).is_empty()
}

/// Writes `value` at `path`, creating intermediate documents as needed.
/// An existing key matching a longer prefix is reused before splitting.
pub fn set(doc: &mut Metadata, path: &str, value: Value) {
    if doc.contains_key(path) || !path.contains('.') {
        doc.insert(path.to_owned(), value);
        return;
    }
    let existing_head = path
        .rmatch_indices('.')
        .map(|(idx, _)| idx)
        .find(|idx| matches!(doc.get(&path[..*idx]), Some(Value::Map(_))));
    let split = existing_head.unwrap_or_else(|| path.find('.').unwrap_or(path.len()));
    let (head, rest) = (&path[..split], &path[split + 1..]);
    let entry = doc
        .entry(head.to_owned())
        .or_insert_with(|| Value::Map(Metadata::new()));
    if !matches!(entry, Value::Map(_)) {
        *entry = Value::Map(Metadata::new());
    }
    if let Value::Map(inner) = entry {
        set(inner, rest, value);
    }
}

/// Removes the value at `path`. Returns the removed value, if any.
pub fn remove(doc: &mut Metadata, path: &str) -> Option<Value> {
    if let Some(value) = doc.remove(path) {
        return Some(value);
    }
    for (idx, _) in path.rmatch_indices('.') {
        let (head, rest) = (&path[..idx], &path[idx + 1..]);
        if let Some(Value::Map(inner)) = doc.get_mut(head) {
            if let Some(removed) = remove(inner, rest) {
                if inner.is_empty() {
                    doc.remove(head);
                }
                return Some(removed);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata;

    fn sample() -> Metadata {
        serde_json::from_str(
            r#"{
                "A": {"B": {"C": 123, "D": [1, 2, 3]}, "F": {"G": 123}},
                "Docker": {"Labels": {"a.b.c": "123", "a~b/c@d": "456"}},
                "Routes": [{"Prefix": "10.0.0.0/8"}, {"Prefix": "0.0.0.0/0"}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn nested_lookup() {
        let doc = sample();
        assert_eq!(lookup(&doc, "A.B.C"), Some(&Value::Int(123)));
        assert_eq!(lookup(&doc, "A.F.G"), Some(&Value::Int(123)));
        assert!(lookup(&doc, "A.B.Z").is_none());
        assert!(lookup(&doc, "A.B.C.D").is_none());
    }

    #[test]
    fn keys_with_dots_resolve() {
        let doc = sample();
        assert_eq!(lookup(&doc, "Docker.Labels.a.b.c"), Some(&Value::from("123")));
        assert_eq!(lookup(&doc, "Docker.Labels.a~b/c@d"), Some(&Value::from("456")));
    }

    #[test]
    fn collect_fans_out_through_sequences() {
        let doc = sample();
        let prefixes = collect(&doc, "Routes.Prefix");
        assert_eq!(prefixes.len(), 2);
        assert!(contains(&doc, "A.B.D"));
        assert!(!contains(&doc, "Routes.Gateway"));
    }

    #[test]
    fn set_creates_intermediate_documents() {
        let mut doc = metadata! { "Name" => "br0" };
        set(&mut doc, "UserMetadata.owner", Value::from("ops"));
        set(&mut doc, "UserMetadata.team", Value::from("net"));
        assert_eq!(lookup(&doc, "UserMetadata.owner"), Some(&Value::from("ops")));
        assert_eq!(doc["UserMetadata"].as_map().unwrap().len(), 2);
    }

    #[test]
    fn remove_prunes_empty_parents() {
        let mut doc = metadata! { "Name" => "br0" };
        set(&mut doc, "UserMetadata.owner", Value::from("ops"));
        assert_eq!(remove(&mut doc, "UserMetadata.owner"), Some(Value::from("ops")));
        assert!(!doc.contains_key("UserMetadata"));
        assert_eq!(remove(&mut doc, "UserMetadata.owner"), None);
    }
}
