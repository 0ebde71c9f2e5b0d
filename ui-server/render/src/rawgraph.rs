use crate::{Renderer, Result};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use ui_server_core::{EdgeLabel, ObjectGraph, Oid};
use ui_server_k8s_api::{
    identity::UserInfo,
    meta::{RawEdge, RawGraph, RenderRawGraphRequest},
};

impl Renderer {
    /// Returns the part of the graph connected to the request's source under any label, or the
    /// whole graph without a source.
    pub async fn render_raw_graph(
        &self,
        user: &UserInfo,
        req: &RenderRawGraphRequest,
    ) -> Result<RawGraph> {
        let seed = match &req.source {
            Some(loc) => Some(self.source(user, loc).await?.id.oid()),
            None => None,
        };
        let graph = self.graph().read();
        Ok(raw_graph(&graph, seed.as_ref()))
    }
}

fn raw_graph(graph: &ObjectGraph, seed: Option<&Oid>) -> RawGraph {
    let nodes: BTreeSet<Oid> = match seed {
        Some(seed) => component(graph, seed),
        None => graph
            .triples()
            .flat_map(|(s, _, d)| [s.clone(), d.clone()])
            .collect(),
    };
    let index = nodes
        .iter()
        .enumerate()
        .map(|(i, oid)| (oid.clone(), i))
        .collect::<HashMap<_, _>>();

    let mut edges = BTreeMap::<(usize, usize), BTreeSet<EdgeLabel>>::new();
    for (s, label, d) in graph.triples() {
        if let (Some(&si), Some(&di)) = (index.get(s), index.get(d)) {
            if si < di {
                edges.entry((si, di)).or_default().insert(label);
            }
        }
    }
    RawGraph {
        nodes: nodes.iter().filter_map(|oid| oid.parse().ok()).collect(),
        edges: edges
            .into_iter()
            .map(|((src, dst), labels)| RawEdge {
                src,
                dst,
                labels: labels.into_iter().collect(),
            })
            .collect(),
    }
}

/// Every object reachable from `seed` over edges of any label, including `seed`.
fn component(graph: &ObjectGraph, seed: &Oid) -> BTreeSet<Oid> {
    let mut seen = HashSet::new();
    seen.insert(seed.clone());
    let mut queue = VecDeque::from([seed.clone()]);
    while let Some(oid) = queue.pop_front() {
        for label in EdgeLabel::ALL {
            for next in graph.neighbors(&oid, label) {
                if seen.insert(next.clone()) {
                    queue.push_back(next.clone());
                }
            }
        }
    }
    seen.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ui_server_core::{Connections, ObjectId};

    #[test]
    fn component_with_merged_labels() {
        let mut graph = ObjectGraph::default();
        let id = |k: &str, n: &str| ObjectId::new("", k, "demo", n);
        let (pod, secret, svc, other) = (
            id("Pod", "web-0"),
            id("Secret", "tls"),
            id("Service", "web"),
            id("Pod", "unrelated"),
        );
        let conns: Connections = [
            (EdgeLabel::Config, [secret.oid()].into_iter().collect()),
            (EdgeLabel::Storage, [secret.oid()].into_iter().collect()),
        ]
        .into_iter()
        .collect();
        graph.update(&pod.oid(), conns);
        let conns: Connections = [(EdgeLabel::ExposedBy, [pod.oid()].into_iter().collect())]
            .into_iter()
            .collect();
        graph.update(&svc.oid(), conns);
        let x = id("Secret", "x").oid();
        let conns: Connections = [(EdgeLabel::Config, [x].into_iter().collect())]
            .into_iter()
            .collect();
        graph.update(&other.oid(), conns);

        let raw = raw_graph(&graph, Some(&pod.oid()));
        // Nodes are ordered by OID.
        assert_eq!(raw.nodes, vec![pod.clone(), secret.clone(), svc.clone()]);
        assert_eq!(
            raw.edges,
            vec![
                RawEdge { src: 0, dst: 1, labels: vec![EdgeLabel::Storage, EdgeLabel::Config] },
                RawEdge { src: 0, dst: 2, labels: vec![EdgeLabel::ExposedBy] },
            ]
        );

        let all = raw_graph(&graph, None);
        assert_eq!(all.nodes.len(), 5);
        assert_eq!(all.edges.len(), 3);
    }
}
