//! Keeps the graph's edges for one resource type in sync with the cluster.

use crate::{
    cluster::{api_resource, stamp},
    metrics::ReconcileMetrics,
    object_id, Evaluator, Result, RuleSet,
};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use futures::{future::BoxFuture, prelude::*, stream::FuturesUnordered};
use kube::{
    api::{Api, DynamicObject, ResourceExt},
    runtime::{watcher, WatchStreamExt},
    Client,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};
use ui_server_core::{Oid, ResourceId, SharedGraph};

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);

/// Identifies an object within the reconciled type.
type Key = (Option<String>, String);

pub struct Reconciler {
    rid: ResourceId,
    rules: Arc<RuleSet>,
    evaluator: Arc<Evaluator>,
    graph: SharedGraph,
    metrics: ReconcileMetrics,

    /// Objects reflected in the graph.
    known: HashSet<Oid>,
    /// Objects seen since the watch last restarted, while a relist is in progress.
    relisted: Option<HashSet<Oid>>,
    failures: HashMap<Key, u32>,
}

/// Starts a reconciler for each resource type announced on `types` that participates in a rule.
pub async fn run_all(
    mut types: mpsc::Receiver<ResourceId>,
    client: Client,
    rules: Arc<RuleSet>,
    evaluator: Arc<Evaluator>,
    graph: SharedGraph,
    metrics: ReconcileMetrics,
    drain: drain::Watch,
) {
    while let Some(rid) = types.recv().await {
        if !rules.has_rules(&rid.group_kind()) {
            debug!(%rid, "No connection rules; not watching");
            continue;
        }
        info!(%rid, "Watching");
        let api = Api::<DynamicObject>::all_with(client.clone(), &api_resource(&rid));
        let events = watcher(api, watcher::Config::default()).default_backoff();
        let span = info_span!("reconcile", kind = %rid.kind, group = %rid.group);
        let reconciler = Reconciler::new(rid, rules.clone(), evaluator.clone(), graph.clone())
            .with_metrics(metrics.clone());
        tokio::spawn(reconciler.run(events, drain.clone()).instrument(span));
    }
}

fn backoff(failures: u32) -> Duration {
    let factor = 1u32 << failures.saturating_sub(1).min(16);
    MIN_BACKOFF.saturating_mul(factor).min(MAX_BACKOFF)
}

// === impl Reconciler ===

impl Reconciler {
    pub fn new(
        rid: ResourceId,
        rules: Arc<RuleSet>,
        evaluator: Arc<Evaluator>,
        graph: SharedGraph,
    ) -> Self {
        Self {
            rid,
            rules,
            evaluator,
            graph,
            metrics: ReconcileMetrics::default(),
            known: HashSet::new(),
            relisted: None,
            failures: HashMap::new(),
        }
    }

    pub fn with_metrics(self, metrics: ReconcileMetrics) -> Self {
        Self { metrics, ..self }
    }

    /// Processes watch events until the stream ends or shutdown is signaled.
    ///
    /// Objects that fail to reconcile are retried with exponential backoff.
    pub async fn run<S>(mut self, events: S, drain: drain::Watch)
    where
        S: Stream<Item = Result<watcher::Event<DynamicObject>, watcher::Error>> + Send,
    {
        tokio::pin!(events);
        let shutdown = drain.signaled();
        tokio::pin!(shutdown);
        let mut retries = FuturesUnordered::<BoxFuture<'static, Key>>::new();

        loop {
            let due = tokio::select! {
                _ = &mut shutdown => {
                    debug!("Shutting down");
                    return;
                }
                event = events.next() => match event {
                    Some(Ok(event)) => self.handle(event).await,
                    Some(Err(error)) => {
                        warn!(%error, "Watch failed");
                        continue;
                    }
                    None => return,
                },
                Some(key) = retries.next() => self.retry(key).await,
            };
            for (key, delay) in due {
                retries.push(Box::pin(async move {
                    tokio::time::sleep(delay).await;
                    key
                }));
            }
        }
    }

    /// Applies a watch event, returning the objects that must be retried.
    pub async fn handle(&mut self, event: watcher::Event<DynamicObject>) -> Vec<(Key, Duration)> {
        match event {
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                vec![]
            }
            watcher::Event::InitApply(obj) | watcher::Event::Apply(obj) => {
                self.apply(obj).await.into_iter().collect()
            }
            watcher::Event::InitDone => {
                if let Some(seen) = self.relisted.take() {
                    let mut graph = self.graph.write();
                    for oid in self.known.difference(&seen) {
                        graph.delete(oid);
                        self.metrics.deleted(&self.rid);
                    }
                    self.known.retain(|oid| seen.contains(oid));
                }
                vec![]
            }
            watcher::Event::Delete(obj) => {
                let obj = stamp(&self.rid, obj);
                self.failures.remove(&key(&obj));
                if let Ok(id) = object_id(&obj) {
                    let oid = id.oid();
                    self.graph.write().delete(&oid);
                    self.known.remove(&oid);
                    self.metrics.deleted(&self.rid);
                }
                vec![]
            }
        }
    }

    async fn apply(&mut self, obj: DynamicObject) -> Option<(Key, Duration)> {
        let obj = stamp(&self.rid, obj);
        let key = key(&obj);
        match self.reconcile(&obj).await {
            Ok(oid) => {
                if let Some(seen) = self.relisted.as_mut() {
                    seen.insert(oid.clone());
                }
                self.known.insert(oid);
                self.failures.remove(&key);
                self.metrics.reconciled(&self.rid);
                None
            }
            Err(error) => {
                self.metrics.failed(&self.rid);
                let failures = self.failures.entry(key.clone()).or_default();
                *failures += 1;
                let delay = backoff(*failures);
                warn!(name = %key.1, namespace = ?key.0, %error, ?delay, "Failed to reconcile");
                // Keep the object through a relist so its prior edges survive until the retry.
                if let (Ok(id), Some(seen)) = (object_id(&obj), self.relisted.as_mut()) {
                    seen.insert(id.oid());
                }
                Some((key, delay))
            }
        }
    }

    /// Re-fetches and reconciles an object whose last reconciliation failed.
    pub(crate) async fn retry(&mut self, key: Key) -> Vec<(Key, Duration)> {
        if !self.failures.contains_key(&key) {
            return vec![];
        }
        let (ns, name) = &key;
        match self.evaluator.cluster().get(&self.rid, ns.as_deref(), name).await {
            Ok(Some(obj)) => self.apply(obj).await.into_iter().collect(),
            Ok(None) => {
                self.failures.remove(&key);
                let oid = ui_server_core::ObjectId::new(
                    &self.rid.group,
                    &self.rid.kind,
                    ns.clone().unwrap_or_default(),
                    name,
                )
                .oid();
                self.graph.write().delete(&oid);
                self.known.remove(&oid);
                self.metrics.deleted(&self.rid);
                vec![]
            }
            Err(error) => {
                let failures = self.failures.entry(key.clone()).or_default();
                *failures += 1;
                let delay = backoff(*failures);
                warn!(%name, namespace = ?ns, %error, ?delay, "Failed to fetch object for retry");
                vec![(key, delay)]
            }
        }
    }

    /// Recomputes the edges asserted by `obj` and applies them to the graph.
    pub async fn reconcile(&self, obj: &DynamicObject) -> Result<Oid> {
        let oid = object_id(obj)?.oid();
        let rules = self.rules.rules_for(&self.rid.group_kind());
        let conns = self.evaluator.connections(obj, rules).await?;
        self.graph.write().update(&oid, conns);
        Ok(oid)
    }
}

fn key(obj: &DynamicObject) -> Key {
    (obj.namespace(), obj.name_any())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_to_a_cap() {
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(2), Duration::from_secs(2));
        assert_eq!(backoff(4), Duration::from_secs(8));
        assert_eq!(backoff(9), Duration::from_secs(256));
        assert_eq!(backoff(10), MAX_BACKOFF);
        assert_eq!(backoff(40), MAX_BACKOFF);
    }
}
