#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::sync::Arc;

use topograph::storage::{ListenerResult, QueuedListener};
use topograph::topology::{add_layer2_link, add_ownership_link, ensure_host, owner};
use topograph::topology::{UserMetadataManager, UserMetadataRule};
use topograph::{
    metadata, ElementFilter, Graph, GraphListener, GraphOptions, GraphView, Identifier,
    ListenerError, Metadata, MetadataIndexer, MetricStore, Node, Result, TopoError,
    TraversalEngine,
};

/// host -> br-int -> {p1, p2}; p1 -> intf1; p2 -> patch-int <-> patch-ex;
/// plus a docker container carrying dotted labels.
fn ovs_topology() -> Result<(Arc<Graph>, TraversalEngine)> {
    let graph = Graph::new(GraphOptions::default());
    {
        let mut w = graph.write();
        let host = ensure_host(&mut w, "h1", Metadata::new())?;
        let br = w.new_node(
            "br-int",
            "h1",
            metadata! { "Type" => "ovsbridge", "Name" => "br-int" },
        )?;
        let p1 = w.new_node("p1", "h1", metadata! { "Type" => "ovsport", "Name" => "p1" })?;
        let p2 = w.new_node("p2", "h1", metadata! { "Type" => "ovsport", "Name" => "p2" })?;
        let intf1 = w.new_node(
            "intf1",
            "h1",
            metadata! {
                "Type" => "internal",
                "Name" => "intf1",
                "MTU" => 1500,
                "IPV4" => vec!["10.0.0.1/24", "10.0.0.2/24"],
            },
        )?;
        let patch_int = w.new_node(
            "patch-int",
            "h1",
            metadata! { "Type" => "patch", "Name" => "patch-int" },
        )?;
        let patch_ex = w.new_node(
            "patch-ex",
            "h1",
            metadata! { "Type" => "patch", "Name" => "patch-ex" },
        )?;
        let mut labels = Metadata::new();
        labels.insert("com.docker.compose.project".into(), "web".into());
        let mut docker = Metadata::new();
        docker.insert("Labels".into(), labels.into());
        let container = w.new_node(
            "c1",
            "h1",
            metadata! { "Type" => "container", "Name" => "web-1", "Docker" => docker },
        )?;

        add_ownership_link(&mut w, &host, &br, Metadata::new())?;
        add_ownership_link(&mut w, &host, &container, Metadata::new())?;
        add_ownership_link(&mut w, &br, &p1, Metadata::new())?;
        add_layer2_link(&mut w, &br, &p1, Metadata::new())?;
        add_ownership_link(&mut w, &br, &p2, Metadata::new())?;
        add_layer2_link(&mut w, &p1, &intf1, Metadata::new())?;
        add_layer2_link(&mut w, &p2, &patch_int, Metadata::new())?;
        add_layer2_link(&mut w, &patch_int, &patch_ex, Metadata::new())?;
    }
    let engine = TraversalEngine::new(Arc::clone(&graph), Arc::new(MetricStore::new()));
    Ok((graph, engine))
}

fn names(nodes: &[Arc<Node>]) -> BTreeSet<String> {
    nodes
        .iter()
        .filter_map(|n| n.name().map(str::to_owned))
        .collect()
}

#[test]
fn bridge_ports_are_deduplicated() -> Result<()> {
    let (_, engine) = ovs_topology()?;
    assert_eq!(engine.count("g.V().Has('Type', 'ovsbridge').Out()")?, 3);
    assert_eq!(engine.count("g.V().Has('Type', 'ovsbridge').Out().Dedup()")?, 2);
    assert_eq!(
        engine.count("g.V().Has('Type', 'ovsbridge').Out().Dedup().Count()")?,
        2
    );
    Ok(())
}

#[test]
fn patch_ports_see_both_directions() -> Result<()> {
    let (_, engine) = ovs_topology()?;
    let nodes = engine.get_nodes("g.V().Has('Name', 'patch-int').Both()")?;
    assert_eq!(
        names(&nodes),
        BTreeSet::from(["p2".to_string(), "patch-ex".to_string()])
    );
    let peers = engine.get_nodes("g.V().Has('Name', 'patch-int').Both('Type', 'patch')")?;
    assert_eq!(names(&peers), BTreeSet::from(["patch-ex".to_string()]));
    Ok(())
}

#[test]
fn predicates_select_expected_nodes() -> Result<()> {
    let (_, engine) = ovs_topology()?;
    assert_eq!(engine.count("g.V().Has('Type', Ne('host'))")?, 7);
    assert_eq!(engine.count("g.V().Has('Name', Within('p1', 'p2', 'nope'))")?, 2);
    assert_eq!(engine.count("g.V().Has('Type', Without('ovsport', 'patch'))")?, 4);
    assert_eq!(engine.count("g.V().HasKey('MTU')")?, 1);
    assert_eq!(engine.count("g.V().Has('MTU', 1500.0)")?, 1);
    assert_eq!(engine.count("g.V().Has('MTU', '1500')")?, 0);
    Ok(())
}

#[test]
fn dotted_keys_and_lists_resolve() -> Result<()> {
    let (_, engine) = ovs_topology()?;
    let node = engine.get_node("g.V().Has('Docker.Labels.com.docker.compose.project', 'web')")?;
    assert_eq!(node.id.as_str(), "c1");
    let node = engine.get_node("g.V().Has('IPV4', '10.0.0.2/24')")?;
    assert_eq!(node.name(), Some("intf1"));
    Ok(())
}

#[test]
fn ownership_is_walked_through_edges() -> Result<()> {
    let (graph, engine) = ovs_topology()?;
    let parents =
        engine.get_nodes("g.V().Has('Name', 'p1').InE().Has('RelationType', 'ownership').InV()")?;
    assert_eq!(names(&parents), BTreeSet::from(["br-int".to_string()]));

    let edges = engine.get_edges("g.V().Has('Name', 'br-int').OutE('RelationType', 'layer2')")?;
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].child.as_str(), "p1");

    let reader = graph.read();
    let view: &dyn GraphView = &*reader;
    let host = owner(view, &Identifier::from("br-int")).map(|n| n.host.clone());
    assert_eq!(host.as_deref(), Some("h1"));
    Ok(())
}

#[test]
fn missing_node_is_reported_not_found() -> Result<()> {
    let (graph, engine) = ovs_topology()?;
    let err = engine.get_node("g.V('missing')").unwrap_err();
    assert!(err.is_not_found());
    let err = engine.get_node("g.V().Has('Type', 'router')").unwrap_err();
    assert!(matches!(err, TopoError::NoMatch { .. }));
    assert!(graph.get_node(&"missing".into()).is_none());
    Ok(())
}

#[test]
fn user_metadata_overlay_round_trip() -> Result<()> {
    let (graph, engine) = ovs_topology()?;
    let engine = Arc::new(engine);
    let manager = UserMetadataManager::new(Arc::clone(&engine));
    let rule = UserMetadataRule::new(
        "G.V().Has('Name', 'br-int', 'Type', 'ovsbridge')",
        "testKey",
        "testValue",
    );
    manager.add_rule("br", rule)?;
    assert_eq!(
        engine.count("g.V().Has('UserMetadata.testKey', 'testValue')")?,
        1
    );
    manager.remove_rule("br")?;
    assert_eq!(
        engine.count("g.V().Has('UserMetadata.testKey', 'testValue')")?,
        0
    );
    let br = graph.get_node(&"br-int".into()).expect("bridge");
    assert_eq!(br.revision, 3);
    Ok(())
}

/// A collaborator resolving pods through an index, the way a cluster
/// probe attaches pods to their nodes.
#[test]
fn indexed_collaborator_links_pods_to_hosts() -> Result<()> {
    let graph = Graph::new(GraphOptions::default());
    let hosts = MetadataIndexer::new(
        Arc::clone(&graph),
        ElementFilter::new().with("Type", "host"),
        "Name",
    );
    hosts.start();
    let engine = TraversalEngine::new(Arc::clone(&graph), Arc::new(MetricStore::new()));
    engine.register_indexer(Arc::clone(&hosts));

    graph.new_node(
        "node-a",
        "node-a",
        metadata! { "Type" => "host", "Name" => "node-a" },
    )?;
    graph.new_node(
        "node-b",
        "node-b",
        metadata! { "Type" => "host", "Name" => "node-b" },
    )?;

    for (pod, host) in [("pod-1", "node-a"), ("pod-2", "node-a"), ("pod-3", "node-b")] {
        let mut w = graph.write();
        let target = hosts.get(host).into_iter().next().expect("indexed host");
        let node = w.new_node(
            pod,
            host,
            metadata! { "Type" => "pod", "Name" => pod, "Node" => host },
        )?;
        add_ownership_link(&mut w, &target, &node, Metadata::new())?;
    }

    assert_eq!(hosts.len(), 2);
    assert_eq!(
        engine.count("g.V().Has('Type', 'host', 'Name', 'node-a').Out('Type', 'pod')")?,
        2
    );

    graph.del_node(&"node-b".into())?;
    assert!(hosts.get("node-b").is_empty());
    assert_eq!(engine.count("g.V().Has('Type', 'pod').In()")?, 2);
    Ok(())
}

/// br-owner carries one port per interface, ports and interfaces sharing a
/// name; the internal interface belongs to the host instead.
fn tunnel_topology() -> Result<TraversalEngine> {
    let graph = Graph::new(GraphOptions::default());
    {
        let mut w = graph.write();
        let host = ensure_host(&mut w, "h1", Metadata::new())?;
        let bridge = w.new_node(
            "br-owner",
            "h1",
            metadata! { "Type" => "ovsbridge", "Name" => "br-owner" },
        )?;
        add_ownership_link(&mut w, &host, &bridge, Metadata::new())?;
        for (name, kind) in [
            ("patch-br-owner", "patch"),
            ("gre-br-owner", "gre"),
            ("vxlan-br-owner", "vxlan"),
            ("geneve-br-owner", "geneve"),
            ("intf-owner", "internal"),
        ] {
            let port = w.new_node(
                format!("port-{name}"),
                "h1",
                metadata! { "Type" => "ovsport", "Name" => name },
            )?;
            let intf = w.new_node(
                format!("intf-{name}"),
                "h1",
                metadata! { "Type" => kind, "Name" => name },
            )?;
            add_ownership_link(&mut w, &bridge, &port, Metadata::new())?;
            add_layer2_link(&mut w, &bridge, &port, Metadata::new())?;
            add_layer2_link(&mut w, &port, &intf, Metadata::new())?;
            let owner = if kind == "internal" { &host } else { &bridge };
            add_ownership_link(&mut w, owner, &intf, Metadata::new())?;
        }
    }
    Ok(TraversalEngine::new(graph, Arc::new(MetricStore::new())))
}

#[test]
fn tunnel_interfaces_have_one_owner() -> Result<()> {
    let engine = tunnel_topology()?;
    for intf in ["patch-br-owner", "gre-br-owner", "vxlan-br-owner", "geneve-br-owner"] {
        let query = format!(
            "g.V().Has('Name', '{intf}', 'Type', NE('ovsport')).InE().Has('RelationType', 'ownership').InV().Has('Name', 'br-owner')"
        );
        assert_eq!(engine.get_nodes(&query)?.len(), 1, "{intf}");
    }
    let hosts = engine.get_nodes(
        "g.V().Has('Name', 'intf-owner', 'Type', NE('ovsport')).InE().Has('RelationType', 'ownership').InV().Has('Type', 'host')",
    )?;
    assert_eq!(hosts.len(), 1);

    let children = engine
        .get_nodes("g.V().Has('Name', 'br-owner').OutE().Has('RelationType', 'ownership').OutV()")?;
    assert_eq!(children.len(), 9);
    Ok(())
}

#[test]
fn ne_and_within_restrict_destinations() -> Result<()> {
    let (_, engine) = ovs_topology()?;
    let owned = engine.get_nodes("g.V().Has('Type', 'host').Out('Type', Ne('container'))")?;
    assert_eq!(names(&owned), BTreeSet::from(["br-int".to_string()]));
    assert_eq!(
        engine.count("g.V().Has('Type', 'ovsbridge').Out('Type', Ne('ovsport'))")?,
        0
    );
    let picked = engine.get_nodes(
        "g.V().Has('Type', 'ovsbridge').Out('Name', Within('p2', 'intf1')).Dedup()",
    )?;
    assert_eq!(names(&picked), BTreeSet::from(["p2".to_string()]));
    let reached = engine.get_nodes(
        "g.V().Has('Type', 'ovsport').Out('Name', Within('intf1', 'patch-int'), 'Type', Ne('patch'))",
    )?;
    assert_eq!(names(&reached), BTreeSet::from(["intf1".to_string()]));
    Ok(())
}

#[test]
fn limit_truncates_nodes_and_edges() -> Result<()> {
    let (_, engine) = ovs_topology()?;
    assert_eq!(engine.count("g.V().Has('Type', 'ovsport').Limit(1)")?, 1);
    assert_eq!(engine.count("g.V().Has('Type', 'ovsport').Limit(0)")?, 0);
    assert_eq!(engine.count("g.V().Has('Type', 'ovsport').Limit(10)")?, 2);
    assert_eq!(engine.get_edges("g.V().OutE().Limit(2)")?.len(), 2);
    let first = engine.get_nodes("g.V().Has('Type', 'ovsport')")?;
    let limited = engine.get_nodes("g.V().Has('Type', 'ovsport').Limit(1)")?;
    assert_eq!(limited[0].id, first[0].id);
    Ok(())
}

/// Links pods to the host they run on as soon as that host gets indexed.
struct PodLinker {
    graph: Arc<Graph>,
    pods: Arc<MetadataIndexer>,
}

impl GraphListener for PodLinker {
    fn on_node_added(&self, host: &Node) -> ListenerResult {
        let Some(name) = host.name() else {
            return Ok(());
        };
        let mut w = self.graph.write();
        let Some(host) = w.get_node(&host.id) else {
            return Ok(());
        };
        for pod in self.pods.get(name) {
            add_ownership_link(&mut w, &host, &pod, Metadata::new())
                .map_err(|err| ListenerError::new(err.to_string()))?;
        }
        Ok(())
    }
}

#[test]
fn index_membership_drives_a_queued_collaborator() -> Result<()> {
    let graph = Graph::new(GraphOptions::default());
    let hosts = MetadataIndexer::new(
        Arc::clone(&graph),
        ElementFilter::new().with("Type", "host"),
        "Name",
    );
    let pods = MetadataIndexer::new(
        Arc::clone(&graph),
        ElementFilter::new().with("Type", "pod"),
        "Node",
    );
    hosts.start();
    pods.start();
    let linker = QueuedListener::spawn(
        "pod-linker",
        Arc::new(PodLinker {
            graph: Arc::clone(&graph),
            pods: Arc::clone(&pods),
        }),
    );
    let registration = hosts.add_listener(linker.clone());

    for (pod, node) in [("pod-1", "node-a"), ("pod-2", "node-a"), ("pod-3", "node-b")] {
        graph.new_node(pod, node, metadata! { "Type" => "pod", "Name" => pod, "Node" => node })?;
    }
    graph.new_node("node-a", "node-a", metadata! { "Type" => "host", "Name" => "node-a" })?;

    assert!(hosts.remove_listener(registration));
    linker.stop();

    let engine = TraversalEngine::new(Arc::clone(&graph), Arc::new(MetricStore::new()));
    let owned = engine.get_nodes("g.V().Has('Type', 'host').Out('Type', 'pod')")?;
    assert_eq!(
        names(&owned),
        BTreeSet::from(["pod-1".to_string(), "pod-2".to_string()])
    );
    assert_eq!(engine.count("g.V('pod-3').In()")?, 0);
    Ok(())
}
