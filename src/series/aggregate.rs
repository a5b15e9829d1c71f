//! Pure reductions over metric series. Nothing here touches storage.

use std::collections::BTreeMap;

use super::InterfaceMetric;
use crate::types::Timestamp;

/// Metric series keyed by node identifier, or by [`AGGREGATED_KEY`] once
/// merged.
pub type MetricSet = BTreeMap<String, Vec<InterfaceMetric>>;

/// Key of the merged series produced by [`aggregates`].
pub const AGGREGATED_KEY: &str = "Aggregated";

/// Largest bucket width, in seconds, whose millisecond value fits a
/// [`Timestamp`].
pub const MAX_BUCKET_SECS: i64 = i64::MAX / 1_000;

/// Merges every series into one ordered by start time. Records with equal
/// starts keep the order they were appended to the store in; records that
/// never went through a store keep their position in the set.
pub fn aggregates(set: &MetricSet) -> Vec<InterfaceMetric> {
    let mut merged: Vec<InterfaceMetric> = set.values().flatten().copied().collect();
    merged.sort_by_key(|r| (r.start, r.seq));
    merged
}

/// Like [`aggregates`], but records whose start falls in the same
/// `bucket`-wide slot are summed into one record.
pub fn bucketed(set: &MetricSet, bucket: Timestamp) -> Vec<InterfaceMetric> {
    if bucket <= 0 {
        return aggregates(set);
    }
    let mut slots: BTreeMap<Timestamp, InterfaceMetric> = BTreeMap::new();
    for record in aggregates(set) {
        slots
            .entry(record.start.div_euclid(bucket))
            .and_modify(|acc| *acc += &record)
            .or_insert(record);
    }
    slots.into_values().collect()
}

/// Folds a series into one record. `None` for an empty series.
pub fn sum<'a>(records: impl IntoIterator<Item = &'a InterfaceMetric>) -> Option<InterfaceMetric> {
    records.into_iter().fold(None, |acc, record| match acc {
        None => Some(*record),
        Some(mut total) => {
            total += record;
            Some(total)
        }
    })
}

/// Wraps a merged series into a set under [`AGGREGATED_KEY`].
pub fn aggregated_set(records: Vec<InterfaceMetric>) -> MetricSet {
    let mut set = MetricSet::new();
    set.insert(AGGREGATED_KEY.to_owned(), records);
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> MetricSet {
        let mut set = MetricSet::new();
        set.insert(
            "a".into(),
            vec![
                InterfaceMetric::new(0, 999).with_packets(1, 2),
                InterfaceMetric::new(2000, 2999).with_packets(1, 2),
            ],
        );
        set.insert(
            "b".into(),
            vec![InterfaceMetric::new(1000, 1999).with_packets(0, 5)],
        );
        set
    }

    #[test]
    fn merge_is_ordered_and_preserves_count() {
        let merged = aggregates(&set());
        let starts: Vec<_> = merged.iter().map(|r| r.start).collect();
        assert_eq!(starts, vec![0, 1000, 2000]);
        let input = set();
        assert_eq!(input.values().map(Vec::len).sum::<usize>(), merged.len());
    }

    #[test]
    fn equal_starts_follow_append_order() {
        let store = crate::series::MetricStore::new();
        store
            .append(&"b".into(), InterfaceMetric::new(0, 999).with_packets(0, 2))
            .unwrap();
        store
            .append(&"a".into(), InterfaceMetric::new(0, 999).with_packets(0, 1))
            .unwrap();
        let mut set = MetricSet::new();
        for node in ["a", "b"] {
            set.insert(node.into(), store.records(&node.into()));
        }
        let tx: Vec<_> = aggregates(&set).iter().map(|r| r.tx_packets).collect();
        assert_eq!(tx, vec![2, 1]);
    }

    #[test]
    fn sum_saturates_instead_of_overflowing() {
        let records = [
            InterfaceMetric::new(0, 999).with_packets(0, i64::MAX),
            InterfaceMetric::new(1000, 1999).with_packets(0, 1),
        ];
        assert_eq!(sum(&records).unwrap().tx_packets, i64::MAX);
    }

    #[test]
    fn buckets_sum_within_slot() {
        let merged = bucketed(&set(), 2000);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].tx_packets, 7);
        assert_eq!((merged[0].start, merged[0].last), (0, 1999));
    }

    #[test]
    fn sum_folds_field_wise() {
        let merged = aggregates(&set());
        let total = sum(&merged).unwrap();
        assert_eq!(total.tx_packets, 9);
        assert_eq!((total.start, total.last), (0, 2999));
        assert!(sum(&Vec::new()).is_none());
    }
}
