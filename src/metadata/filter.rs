//! Metadata predicates shared by `Has`-style query steps and indexer filters.

use smallvec::SmallVec;

use super::path;
use super::value::{Metadata, Value};

/// Predicate applied to the values found at one dot path.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Some value at the path equals the literal.
    Eq(Value),
    /// The path is present and no value equals the literal.
    Ne(Value),
    /// Some value at the path equals one of the literals.
    Within(Vec<Value>),
    /// The path is present and no value equals any of the literals.
    Without(Vec<Value>),
    /// The path is present, whatever its value.
    Exists,
}

impl Predicate {
    /// Evaluates the predicate against the values resolved at a path.
    /// Type mismatches evaluate to "no match"; they never fail.
    pub fn test(&self, values: &[&Value]) -> bool {
        if values.is_empty() {
            return false;
        }
        match self {
            Predicate::Eq(lit) => values.iter().any(|v| v.loosely_equals(lit)),
            Predicate::Ne(lit) => !values.iter().any(|v| v.loosely_equals(lit)),
            Predicate::Within(lits) => values
                .iter()
                .any(|v| lits.iter().any(|lit| v.loosely_equals(lit))),
            Predicate::Without(lits) => !values
                .iter()
                .any(|v| lits.iter().any(|lit| v.loosely_equals(lit))),
            Predicate::Exists => true,
        }
    }
}

macro_rules! eq_predicate_from {
    ($($ty:ty),+) => {
        $(impl From<$ty> for Predicate {
            fn from(value: $ty) -> Self {
                Predicate::Eq(Value::from(value))
            }
        })+
    };
}

eq_predicate_from!(Value, &str, String, bool, i64, i32, f64);

/// Conjunction of `(path, predicate)` terms.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElementFilter {
    terms: SmallVec<[(String, Predicate); 4]>,
}

impl ElementFilter {
    /// Filter matching everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a term.
    pub fn with(mut self, path: impl Into<String>, predicate: impl Into<Predicate>) -> Self {
        self.terms.push((path.into(), predicate.into()));
        self
    }

    /// Equality filter over the top-level pairs of a document, e.g. the
    /// `{"Type": "host"}` filters used by collectors.
    pub fn from_metadata(doc: &Metadata) -> Self {
        Self {
            terms: doc
                .iter()
                .map(|(k, v)| (k.clone(), Predicate::Eq(v.clone())))
                .collect(),
        }
    }

    /// Returns the terms in declaration order.
    pub fn terms(&self) -> &[(String, Predicate)] {
        &self.terms
    }

    /// Returns true when the filter has no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Returns the literal of the equality term on `path`, if any.
    pub fn equality_on(&self, path: &str) -> Option<&Value> {
        self.terms.iter().find_map(|(p, pred)| match pred {
            Predicate::Eq(v) if p == path => Some(v),
            _ => None,
        })
    }

    /// Returns true if every term of `self` is an equality term also present
    /// in `other`, meaning `other` is at least as selective.
    pub fn implied_by(&self, other: &ElementFilter) -> bool {
        self.terms.iter().all(|(p, pred)| match pred {
            Predicate::Eq(v) => other.equality_on(p).is_some_and(|o| o == v),
            _ => other.terms.iter().any(|(op, opred)| op == p && opred == pred),
        })
    }

    /// Evaluates the conjunction against a metadata document.
    pub fn matches(&self, doc: &Metadata) -> bool {
        self.terms
            .iter()
            .all(|(p, pred)| pred.test(&path::collect(doc, p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata;

    #[test]
    fn conjunction_of_terms() {
        let doc = metadata! { "Type" => "ovsbridge", "Name" => "br-test1" };
        assert!(ElementFilter::new()
            .with("Type", "ovsbridge")
            .with("Name", "br-test1")
            .matches(&doc));
        assert!(!ElementFilter::new()
            .with("Type", "ovsbridge")
            .with("Name", "br-test2")
            .matches(&doc));
        assert!(ElementFilter::new().matches(&doc));
    }

    #[test]
    fn negation_requires_presence() {
        let doc = metadata! { "Name" => "intf1", "Type" => "internal" };
        assert!(ElementFilter::new()
            .with("Type", Predicate::Ne("ovsport".into()))
            .matches(&doc));
        assert!(!ElementFilter::new()
            .with("Driver", Predicate::Ne("ovs".into()))
            .matches(&doc));
    }

    #[test]
    fn within_and_without() {
        let doc = metadata! { "Name" => "ns2" };
        let within = Predicate::Within(vec!["ns1".into(), "ns2".into()]);
        assert!(ElementFilter::new().with("Name", within).matches(&doc));
        let without = Predicate::Without(vec!["ns1".into(), "ns2".into()]);
        assert!(!ElementFilter::new().with("Name", without).matches(&doc));
    }

    #[test]
    fn mismatched_literal_types_exclude() {
        let doc = metadata! { "MTU" => 1500 };
        assert!(!ElementFilter::new().with("MTU", "1500").matches(&doc));
        assert!(ElementFilter::new().with("MTU", 1500.0).matches(&doc));
    }

    #[test]
    fn implication_of_equality_terms() {
        let index = ElementFilter::new().with("Type", "host");
        let query = ElementFilter::new().with("Name", "h1").with("Type", "host");
        assert!(index.implied_by(&query));
        assert!(!query.implied_by(&index));
    }
}
