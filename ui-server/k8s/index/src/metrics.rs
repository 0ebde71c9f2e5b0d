use crate::SharedRegistry;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeLabelSet, EncodeMetric},
    metrics::{counter::Counter, family::Family, gauge::ConstGauge, MetricType},
    registry::Registry,
};
use ui_server_core::{ResourceId, SharedGraph};

#[derive(Debug)]
struct Instrumented {
    graph: SharedGraph,
    registry: SharedRegistry,
}

/// Counts reconciler outcomes per resource type.
#[derive(Clone, Debug, Default)]
pub struct ReconcileMetrics {
    reconciles: Family<KindLabels, Counter>,
    failures: Family<KindLabels, Counter>,
    deletes: Family<KindLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    group: String,
    kind: String,
}

/// Registers gauges describing the graph and the set of discovered types.
pub fn register(reg: &mut Registry, graph: SharedGraph, registry: SharedRegistry) {
    reg.register_collector(Box::new(Instrumented { graph, registry }));
}

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let (nodes, edges) = {
            let graph = self.graph.read();
            (graph.node_count(), graph.edge_counts())
        };

        let nodes_encoder = encoder.encode_descriptor(
            "nodes",
            "The number of objects in the graph",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(nodes as i64).encode(nodes_encoder)?;

        let mut edges_encoder = encoder.encode_descriptor(
            "edges",
            "The number of undirected edges in the graph",
            None,
            MetricType::Gauge,
        )?;
        for (label, count) in edges {
            let labels = [("label", label.as_str())];
            let edge_encoder = edges_encoder.encode_family(&labels)?;
            ConstGauge::new(count as i64).encode(edge_encoder)?;
        }

        let types_encoder = encoder.encode_descriptor(
            "resource_types",
            "The number of discovered resource kinds",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(self.registry.read().len() as i64).encode(types_encoder)?;

        Ok(())
    }
}

// === impl ReconcileMetrics ===

impl ReconcileMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let reconciles = Family::default();
        prom.register(
            "reconciles",
            "Count of objects reconciled into the graph",
            reconciles.clone(),
        );

        let failures = Family::default();
        prom.register(
            "reconcile_failures",
            "Count of failed reconciliations",
            failures.clone(),
        );

        let deletes = Family::default();
        prom.register(
            "deletes",
            "Count of objects removed from the graph",
            deletes.clone(),
        );

        Self {
            reconciles,
            failures,
            deletes,
        }
    }

    pub(crate) fn reconciled(&self, rid: &ResourceId) {
        self.reconciles.get_or_create(&KindLabels::from(rid)).inc();
    }

    pub(crate) fn failed(&self, rid: &ResourceId) {
        self.failures.get_or_create(&KindLabels::from(rid)).inc();
    }

    pub(crate) fn deleted(&self, rid: &ResourceId) {
        self.deletes.get_or_create(&KindLabels::from(rid)).inc();
    }
}

impl From<&ResourceId> for KindLabels {
    fn from(rid: &ResourceId) -> Self {
        Self {
            group: rid.group.clone(),
            kind: rid.kind.clone(),
        }
    }
}
