#![allow(missing_docs)]

use std::sync::Arc;

use topograph::series::AGGREGATED_KEY;
use topograph::{
    metadata, EngineOptions, Graph, GraphOptions, InterfaceMetric, ManualClock, MetricStore,
    QueryError, Result, TopoError, TraversalEngine,
};

/// Aligned on a 5 second boundary.
const T0: i64 = 1_479_899_810_000;

/// Two veth peers, each with fifteen one-second records of one packet
/// each way.
fn peers() -> Result<(Arc<Graph>, Arc<MetricStore>)> {
    let clock = Arc::new(ManualClock::new(T0 - 10_000));
    let graph = Graph::new(GraphOptions::default().clock(clock));
    let store = Arc::new(MetricStore::new());
    graph.new_node("veth-a", "h", metadata! { "Type" => "veth", "Name" => "a" })?;
    graph.new_node("veth-b", "h", metadata! { "Type" => "veth", "Name" => "b" })?;
    graph.new_node("h", "h", metadata! { "Type" => "host", "Name" => "h" })?;
    graph.new_edge(
        "peer",
        &"veth-a".into(),
        &"veth-b".into(),
        metadata! { "RelationType" => "layer2" },
    )?;
    for node in ["veth-a", "veth-b"] {
        // Appended out of order; the store keeps series sorted.
        for i in (0..15).rev() {
            let start = T0 + i * 1_000;
            store.append(
                &node.into(),
                InterfaceMetric::new(start, start + 999)
                    .with_packets(1, 1)
                    .with_bytes(64, 64),
            )?;
        }
    }
    Ok((graph, store))
}

fn engine() -> Result<TraversalEngine> {
    let (graph, store) = peers()?;
    Ok(TraversalEngine::new(graph, store))
}

#[test]
fn sum_over_both_interfaces() -> Result<()> {
    let engine = engine()?;
    let total = engine.get_metric("g.V().Has('Type', 'veth').Metrics().Sum()")?;
    assert_eq!(total.tx_packets, 30);
    assert_eq!(total.rx_packets, 30);
    assert_eq!(total.tx_bytes, 30 * 64);
    assert_eq!(total.start, T0);
    assert_eq!(total.last, T0 + 14_999);
    Ok(())
}

#[test]
fn series_are_keyed_and_sorted() -> Result<()> {
    let engine = engine()?;
    let set = engine.get_metrics("g.V().Has('Type', 'veth').Metrics()")?;
    assert_eq!(set.keys().collect::<Vec<_>>(), ["veth-a", "veth-b"]);
    for records in set.values() {
        assert_eq!(records.len(), 15);
        assert!(records.windows(2).all(|w| w[0].start < w[1].start));
    }
    let json = serde_json::to_value(&set["veth-a"][0]).map_err(TopoError::from)?;
    assert_eq!(json["TxPackets"], 1);
    assert_eq!(json["Start"], T0);
    Ok(())
}

#[test]
fn aggregates_merge_in_start_order() -> Result<()> {
    let engine = engine()?;
    let set = engine.get_metrics("g.V().Has('Type', 'veth').Metrics().Aggregates()")?;
    let merged = &set[AGGREGATED_KEY];
    assert_eq!(set.len(), 1);
    assert_eq!(merged.len(), 30);
    assert!(merged.windows(2).all(|w| w[0].start <= w[1].start));

    let buckets =
        engine.get_metrics("g.V().Has('Type', 'veth').Metrics().Aggregates(5)")?;
    let buckets = &buckets[AGGREGATED_KEY];
    assert_eq!(buckets.len(), 3);
    assert!(buckets.iter().all(|b| b.tx_packets == 10));
    assert_eq!(buckets[1].start, T0 + 5_000);
    assert_eq!(buckets[1].last, T0 + 9_999);

    let total = engine.get_metric("g.V().Has('Type', 'veth').Metrics().Aggregates(5).Sum()")?;
    assert_eq!(total.tx_packets, 30);
    Ok(())
}

#[test]
fn configured_bucket_applies_to_bare_aggregates() -> Result<()> {
    let (graph, store) = peers()?;
    let engine = TraversalEngine::new(graph, store)
        .with_options(EngineOptions::default().aggregate_bucket_secs(Some(5)));
    let set = engine.get_metrics("g.V().Metrics().Aggregates()")?;
    assert_eq!(set[AGGREGATED_KEY].len(), 3);
    Ok(())
}

#[test]
fn context_restricts_records_to_the_window() -> Result<()> {
    let engine = engine()?;
    // Window [T0 + 2999, T0 + 4999] overlaps records 2, 3 and 4.
    let query = format!(
        "g.Context({}, 2).V().Has('Type', 'veth').Metrics().Sum()",
        T0 + 4_999
    );
    let total = engine.get_metric(&query)?;
    assert_eq!(total.tx_packets, 6);
    assert_eq!(total.start, T0 + 2_000);
    Ok(())
}

#[test]
fn repeated_nodes_are_counted_once() -> Result<()> {
    let engine = engine()?;
    let total = engine.get_metric("g.V().Has('Type', 'veth').Both().Both().Metrics().Sum()")?;
    assert_eq!(total.tx_packets, 30);
    Ok(())
}

#[test]
fn empty_and_mistyped_chains() -> Result<()> {
    let engine = engine()?;
    let err = engine
        .get_metric("g.V().Has('Type', 'host').Metrics().Sum()")
        .unwrap_err();
    assert!(err.is_not_found());

    match engine.execute("g.V().Sum()").unwrap_err() {
        TopoError::Query(err @ QueryError::TypeMismatch { .. }) => {
            assert_eq!(err.code(), "TypeError")
        }
        other => panic!("unexpected error: {other}"),
    }

    let store = MetricStore::new();
    let err = store
        .append(&"veth-a".into(), InterfaceMetric::new(10, 5))
        .unwrap_err();
    assert!(matches!(err, TopoError::InvalidMetric(_)));
    Ok(())
}

#[test]
fn oversized_bucket_is_rejected() -> Result<()> {
    let engine = engine()?;
    match engine
        .execute("g.V().Metrics().Aggregates(9223372036854775807)")
        .unwrap_err()
    {
        TopoError::Query(err) => assert_eq!(err.code(), "BadArgument"),
        other => panic!("unexpected error: {other}"),
    }

    let (graph, store) = peers()?;
    let engine = TraversalEngine::new(graph, store)
        .with_options(EngineOptions::default().aggregate_bucket_secs(Some(i64::MAX)));
    let set = engine.get_metrics("g.V().Metrics().Aggregates()")?;
    assert_eq!(set[AGGREGATED_KEY].len(), 30);
    Ok(())
}

#[test]
fn large_counters_saturate() -> Result<()> {
    let graph = Graph::new(GraphOptions::default());
    let store = Arc::new(MetricStore::new());
    graph.new_node("eth0", "h", metadata! { "Type" => "device" })?;
    store.append(
        &"eth0".into(),
        InterfaceMetric::new(0, 999).with_packets(0, i64::MAX),
    )?;
    store.append(&"eth0".into(), InterfaceMetric::new(1000, 1999).with_packets(0, 1))?;
    let engine = TraversalEngine::new(graph, store);
    assert_eq!(engine.get_metric("g.V().Metrics().Sum()")?.tx_packets, i64::MAX);
    let buckets = engine.get_metrics("g.V().Metrics().Aggregates(10)")?;
    assert_eq!(buckets[AGGREGATED_KEY][0].tx_packets, i64::MAX);
    Ok(())
}

#[test]
fn equal_starts_merge_in_append_order() -> Result<()> {
    let graph = Graph::new(GraphOptions::default());
    let store = Arc::new(MetricStore::new());
    for node in ["a", "b"] {
        graph.new_node(node, "h", metadata! { "Type" => "veth" })?;
    }
    store.append(&"b".into(), InterfaceMetric::new(0, 999).with_packets(0, 2))?;
    store.append(&"a".into(), InterfaceMetric::new(0, 999).with_packets(0, 1))?;
    store.append(&"a".into(), InterfaceMetric::new(1000, 1999).with_packets(0, 3))?;
    let engine = TraversalEngine::new(graph, store);
    let set = engine.get_metrics("g.V().Metrics().Aggregates()")?;
    let tx: Vec<_> = set[AGGREGATED_KEY].iter().map(|r| r.tx_packets).collect();
    assert_eq!(tx, vec![2, 1, 3]);
    Ok(())
}
