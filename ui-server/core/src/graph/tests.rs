use super::*;
use maplit::btreemap;
use pretty_assertions::assert_eq;

fn oid(kind: &str, name: &str) -> Oid {
    ObjectId::new("", kind, "default", name).oid()
}

fn conns(entries: &[(EdgeLabel, &[&Oid])]) -> Connections {
    entries
        .iter()
        .map(|(l, dsts)| (*l, dsts.iter().map(|o| (*o).clone()).collect()))
        .collect()
}

fn assert_symmetric(graph: &ObjectGraph) {
    for (s, l, d) in graph.triples() {
        assert!(
            graph.neighbors(d, l).any(|o| o == s),
            "missing reverse edge {d} -{l}- {s}"
        );
    }
}

#[test]
fn update_inserts_both_directions() {
    let mut graph = ObjectGraph::default();
    let (a, b) = (oid("Pod", "a"), oid("Secret", "b"));
    graph.update(&a, conns(&[(EdgeLabel::Config, &[&b])]));

    assert_eq!(graph.neighbors(&a, EdgeLabel::Config).collect::<Vec<_>>(), vec![&b]);
    assert_eq!(graph.neighbors(&b, EdgeLabel::Config).collect::<Vec<_>>(), vec![&a]);
    assert_symmetric(&graph);
}

#[test]
fn update_is_idempotent() {
    let mut graph = ObjectGraph::default();
    let (a, b, c) = (oid("Pod", "a"), oid("Secret", "b"), oid("Service", "c"));
    let x = conns(&[(EdgeLabel::Config, &[&b]), (EdgeLabel::ExposedBy, &[&c])]);

    graph.update(&a, x.clone());
    let once = graph.clone();
    graph.update(&a, x);
    assert_eq!(graph, once);
}

#[test]
fn update_applies_only_the_difference() {
    let mut graph = ObjectGraph::default();
    let (a, b, c, d) = (
        oid("Pod", "a"),
        oid("Secret", "b"),
        oid("Secret", "c"),
        oid("Pod", "d"),
    );
    graph.update(&d, conns(&[(EdgeLabel::Config, &[&b])]));
    graph.update(&a, conns(&[(EdgeLabel::Config, &[&b])]));
    graph.update(&a, conns(&[(EdgeLabel::Config, &[&c])]));

    let from_a = graph
        .neighbors(&a, EdgeLabel::Config)
        .cloned()
        .collect::<Vec<_>>();
    assert_eq!(from_a, vec![c.clone()]);
    // d's assertion is untouched.
    assert_eq!(
        graph.neighbors(&b, EdgeLabel::Config).collect::<Vec<_>>(),
        vec![&d]
    );
    assert_symmetric(&graph);
}

#[test]
fn empty_update_leaves_bare_node() {
    let mut graph = ObjectGraph::default();
    let (a, b) = (oid("Pod", "a"), oid("Secret", "b"));
    graph.update(&a, conns(&[(EdgeLabel::Config, &[&b])]));
    graph.update(&a, Connections::default());

    assert!(graph.contains(&a));
    assert_eq!(graph.neighbors(&a, EdgeLabel::Config).count(), 0);
    assert_eq!(graph.neighbors(&b, EdgeLabel::Config).count(), 0);
    assert!(graph.asserted(&a).is_none());
    assert_eq!(graph.edge_counts(), BTreeMap::new());
}

#[test]
fn self_edges_are_dropped() {
    let mut graph = ObjectGraph::default();
    let a = oid("Pod", "a");
    graph.update(&a, conns(&[(EdgeLabel::Offshoot, &[&a])]));
    assert_eq!(graph.neighbors(&a, EdgeLabel::Offshoot).count(), 0);
}

#[test]
fn delete_forgets_isolated_node() {
    let mut graph = ObjectGraph::default();
    let (a, b) = (oid("Pod", "a"), oid("Secret", "b"));
    graph.update(&a, conns(&[(EdgeLabel::Config, &[&b])]));
    graph.delete(&a);
    assert!(!graph.contains(&a));
    assert_eq!(graph.neighbors(&b, EdgeLabel::Config).count(), 0);
}

#[test]
fn delete_withdraws_incoming_edges() {
    let mut graph = ObjectGraph::default();
    let (d, p, q) = (oid("Deployment", "d"), oid("Pod", "p"), oid("Pod", "q"));
    graph.update(&d, conns(&[(EdgeLabel::Offshoot, &[&p, &q])]));
    graph.delete(&p);

    assert!(!graph.contains(&p));
    assert_eq!(graph.neighbors(&d, EdgeLabel::Offshoot).collect::<Vec<_>>(), vec![&q]);

    // A later update from the deployment re-asserting only `q` is a no-op.
    let before = graph.clone();
    graph.update(&d, conns(&[(EdgeLabel::Offshoot, &[&q])]));
    assert_eq!(graph, before);
}

#[test]
fn links_expand_through_offshoots() {
    let mut graph = ObjectGraph::default();
    let a = ObjectId::new("apps", "Deployment", "default", "a").oid();
    let b = ObjectId::new("apps", "ReplicaSet", "default", "b").oid();
    let c = ObjectId::new("", "Pod", "default", "c").oid();
    let m = ObjectId::new("", "ServiceMonitor", "default", "m");
    graph.update(&a, conns(&[(EdgeLabel::Offshoot, &[&b])]));
    graph.update(&b, conns(&[(EdgeLabel::Offshoot, &[&c])]));
    graph.update(&c, conns(&[(EdgeLabel::MonitoredBy, &[&m.oid()])]));

    assert_eq!(
        graph.links(&a, EdgeLabel::MonitoredBy),
        btreemap! { GroupKind::new("", "ServiceMonitor") => vec![m] }
    );
}

#[test]
fn offshoot_links_exclude_self() {
    let mut graph = ObjectGraph::default();
    let a = ObjectId::new("apps", "Deployment", "default", "a").oid();
    let b = ObjectId::new("apps", "ReplicaSet", "default", "b");
    let c = ObjectId::new("", "Pod", "default", "c");
    graph.update(&a, conns(&[(EdgeLabel::Offshoot, &[&b.oid()])]));
    graph.update(&b.oid(), conns(&[(EdgeLabel::Offshoot, &[&c.oid(), &a])]));

    assert_eq!(
        graph.links(&a, EdgeLabel::Offshoot),
        btreemap! {
            GroupKind::new("", "Pod") => vec![c],
            GroupKind::new("apps", "ReplicaSet") => vec![b],
        }
    );
}

#[test]
fn links_of_unknown_oid_are_empty() {
    let graph = ObjectGraph::default();
    assert!(graph.links(&oid("Pod", "nope"), EdgeLabel::View).is_empty());
}

#[test]
fn connected_oids_handles_cycles() {
    let mut graph = ObjectGraph::default();
    let (a, b, c) = (oid("X", "a"), oid("X", "b"), oid("X", "c"));
    graph.update(&a, conns(&[(EdgeLabel::Source, &[&b])]));
    graph.update(&b, conns(&[(EdgeLabel::Source, &[&c])]));
    graph.update(&c, conns(&[(EdgeLabel::Source, &[&a])]));

    let reached = graph.connected_oids([a.clone()], EdgeLabel::Source);
    assert_eq!(reached.len(), 3);
    assert_eq!(graph.connected_oids([a], EdgeLabel::View).len(), 1);
}

#[test]
fn counts_undirected_edges() {
    let mut graph = ObjectGraph::default();
    let (a, b, c) = (oid("X", "a"), oid("X", "b"), oid("X", "c"));
    graph.update(&a, conns(&[(EdgeLabel::Offshoot, &[&b, &c]), (EdgeLabel::View, &[&c])]));
    assert_eq!(
        graph.edge_counts(),
        btreemap! { EdgeLabel::Offshoot => 2, EdgeLabel::View => 1 }
    );
    assert_eq!(graph.node_count(), 3);
}

#[test]
fn delete_kind_removes_only_that_kind() {
    let mut graph = ObjectGraph::default();
    let (a, b, w) = (oid("Pod", "a"), oid("Secret", "b"), oid("Widget", "w"));
    graph.update(&a, conns(&[(EdgeLabel::Config, &[&b]), (EdgeLabel::View, &[&w])]));
    graph.update(&w, conns(&[(EdgeLabel::Config, &[&b])]));

    assert_eq!(graph.delete_kind(&GroupKind::new("", "Widget")), 1);
    assert!(!graph.contains(&w));
    assert_eq!(graph.neighbors(&a, EdgeLabel::View).count(), 0);
    assert_eq!(graph.neighbors(&b, EdgeLabel::Config).collect::<Vec<_>>(), vec![&a]);
    assert_symmetric(&graph);
}
