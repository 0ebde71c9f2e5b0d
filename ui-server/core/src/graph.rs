//! The labelled object multigraph.
//!
//! Edges are stored in both directions so that either endpoint can be queried. Each source also
//! remembers the edges it last asserted, per label, so an update only needs to touch the
//! difference between what it asserted before and what it asserts now.

use crate::{EdgeLabel, GroupKind, ObjectId, Oid};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::Arc,
};

pub type SharedGraph = Arc<RwLock<ObjectGraph>>;

/// The outgoing edges of one source, grouped by label.
pub type Connections = HashMap<EdgeLabel, HashSet<Oid>>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectGraph {
    edges: HashMap<Oid, Connections>,
    sources: HashMap<Oid, Connections>,
}

impl ObjectGraph {
    pub fn shared() -> SharedGraph {
        Arc::new(RwLock::new(Self::default()))
    }

    /// Replaces the edges asserted by `src` with `conns`.
    ///
    /// Only the difference against the previous assertion is applied. Self-edges are dropped.
    pub fn update(&mut self, src: &Oid, mut conns: Connections) {
        for dsts in conns.values_mut() {
            dsts.remove(src);
        }
        conns.retain(|_, dsts| !dsts.is_empty());

        let prev = self.sources.remove(src).unwrap_or_default();
        let labels = prev
            .keys()
            .chain(conns.keys())
            .copied()
            .collect::<BTreeSet<_>>();
        let none = HashSet::new();
        for label in labels {
            let old = prev.get(&label).unwrap_or(&none);
            let new = conns.get(&label).unwrap_or(&none);
            if old == new {
                continue;
            }
            for dst in old.difference(new) {
                self.unlink(src, dst, label);
            }
            for dst in new.difference(old) {
                self.link(src, dst, label);
            }
        }

        self.edges.entry(src.clone()).or_default();
        if !conns.is_empty() {
            self.sources.insert(src.clone(), conns);
        }
    }

    /// Removes `oid` from the graph along with every edge touching it.
    ///
    /// Edges that other sources asserted towards `oid` are also withdrawn from those sources'
    /// assertions, so their next update doesn't try to unlink them again.
    pub fn delete(&mut self, oid: &Oid) {
        self.update(oid, Connections::default());
        let Some(incoming) = self.edges.remove(oid) else {
            return;
        };
        for (label, peers) in incoming {
            for peer in peers {
                if let Some(conns) = self.edges.get_mut(&peer) {
                    if let Some(dsts) = conns.get_mut(&label) {
                        dsts.remove(oid);
                        if dsts.is_empty() {
                            conns.remove(&label);
                        }
                    }
                }
                if let Some(asserted) = self.sources.get_mut(&peer) {
                    if let Some(dsts) = asserted.get_mut(&label) {
                        dsts.remove(oid);
                        if dsts.is_empty() {
                            asserted.remove(&label);
                        }
                    }
                    if asserted.is_empty() {
                        self.sources.remove(&peer);
                    }
                }
            }
        }
    }

    /// Removes every object of kind `gk`, returning how many were removed.
    pub fn delete_kind(&mut self, gk: &GroupKind) -> usize {
        let oids = self
            .edges
            .keys()
            .filter(|oid| oid.parse().is_ok_and(|id| id.group_kind() == *gk))
            .cloned()
            .collect::<Vec<_>>();
        for oid in &oids {
            self.delete(oid);
        }
        oids.len()
    }

    fn link(&mut self, a: &Oid, b: &Oid, label: EdgeLabel) {
        self.edges
            .entry(a.clone())
            .or_default()
            .entry(label)
            .or_default()
            .insert(b.clone());
        self.edges
            .entry(b.clone())
            .or_default()
            .entry(label)
            .or_default()
            .insert(a.clone());
    }

    fn unlink(&mut self, a: &Oid, b: &Oid, label: EdgeLabel) {
        for (from, to) in [(a, b), (b, a)] {
            if let Some(conns) = self.edges.get_mut(from) {
                if let Some(dsts) = conns.get_mut(&label) {
                    dsts.remove(to);
                    if dsts.is_empty() {
                        conns.remove(&label);
                    }
                }
            }
        }
    }

    /// Returns the objects connected to `oid` under `label`, grouped by kind.
    ///
    /// `offshoot` queries return the transitive offshoot closure. Any other label is resolved
    /// from every member of that closure, so relations of an object's offshoots count as the
    /// object's own. The queried object never appears in the result.
    pub fn links(&self, oid: &Oid, label: EdgeLabel) -> BTreeMap<GroupKind, Vec<ObjectId>> {
        let closure = self.connected_oids([oid.clone()], EdgeLabel::Offshoot);
        let mut found = if label == EdgeLabel::Offshoot {
            closure
        } else {
            let mut found = HashSet::new();
            for member in &closure {
                found.extend(self.neighbors(member, label).cloned());
            }
            found
        };
        found.remove(oid);

        let mut groups = BTreeMap::<GroupKind, Vec<ObjectId>>::new();
        for oid in found {
            if let Ok(id) = oid.parse() {
                groups.entry(id.group_kind()).or_default().push(id);
            }
        }
        for ids in groups.values_mut() {
            ids.sort();
        }
        groups
    }

    /// Breadth-first expansion from `seeds` over edges of a single label. Seeds are included.
    pub fn connected_oids(
        &self,
        seeds: impl IntoIterator<Item = Oid>,
        label: EdgeLabel,
    ) -> HashSet<Oid> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        for seed in seeds {
            if visited.insert(seed.clone()) {
                queue.push_back(seed);
            }
        }
        while let Some(next) = queue.pop_front() {
            for peer in self.neighbors(&next, label) {
                if visited.insert(peer.clone()) {
                    queue.push_back(peer.clone());
                }
            }
        }
        visited
    }

    /// Direct neighbors of `oid` under `label`.
    pub fn neighbors<'a>(
        &'a self,
        oid: &Oid,
        label: EdgeLabel,
    ) -> impl Iterator<Item = &'a Oid> + 'a {
        self.edges
            .get(oid)
            .and_then(|conns| conns.get(&label))
            .into_iter()
            .flatten()
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.edges.contains_key(oid)
    }

    /// The edges `src` asserted on its last update.
    pub fn asserted(&self, src: &Oid) -> Option<&Connections> {
        self.sources.get(src)
    }

    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    /// Counts undirected edges per label.
    pub fn edge_counts(&self) -> BTreeMap<EdgeLabel, usize> {
        let mut counts = BTreeMap::new();
        for conns in self.edges.values() {
            for (label, dsts) in conns {
                *counts.entry(*label).or_default() += dsts.len();
            }
        }
        for n in counts.values_mut() {
            *n /= 2;
        }
        counts
    }

    /// Every stored directed half-edge as `(src, label, dst)`.
    pub fn triples(&self) -> impl Iterator<Item = (&Oid, EdgeLabel, &Oid)> + '_ {
        self.edges.iter().flat_map(|(src, conns)| {
            conns
                .iter()
                .flat_map(move |(label, dsts)| dsts.iter().map(move |dst| (src, *label, dst)))
        })
    }
}

#[cfg(test)]
mod tests;
