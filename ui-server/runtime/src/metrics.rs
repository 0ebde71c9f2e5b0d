use parking_lot::RwLock;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeLabelSet, EncodeMetric},
    metrics::{
        counter::Counter, family::Family, gauge::ConstGauge, gauge::Gauge, histogram::Histogram,
        MetricType,
    },
    registry::{Registry, Unit},
};
use std::{sync::Arc, time::Duration};
use tokio::time;
use tracing::{debug, warn};
use ui_server_render::{ReportSnapshot, Renderer};

/// Instruments the API server's requests.
#[derive(Clone, Debug)]
pub struct ApiMetrics {
    requests: Family<CodeLabels, Counter>,
    duration: Family<Labels, Histogram>,
    in_flight: Family<Labels, Gauge>,
    request_size: Family<Labels, Histogram>,
    response_size: Family<Labels, Histogram>,
}

pub(crate) struct RequestObserver {
    start: time::Instant,
    labels: Labels,
    metrics: ApiMetrics,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub(crate) struct Labels {
    group: String,
    resource: String,
    verb: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct CodeLabels {
    group: String,
    resource: String,
    verb: &'static str,
    code: String,
}

/// Cluster-wide vulnerability, image and policy gauges.
///
/// Encoding reads the last snapshot; [`ReportMetrics::refresh`] replaces it periodically.
#[derive(Clone, Debug)]
pub struct ReportMetrics {
    cluster: String,
    snapshot: Arc<RwLock<ReportSnapshot>>,
}

fn size_histogram() -> Histogram {
    Histogram::new(prometheus_client::metrics::histogram::exponential_buckets(
        64.0, 4.0, 10,
    ))
}

// === impl ApiMetrics ===

impl ApiMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let requests = Family::<CodeLabels, Counter>::default();
        reg.register(
            "requests",
            "Total number of requests handled, by response code",
            requests.clone(),
        );

        let duration = Family::<Labels, Histogram>::new_with_constructor(|| {
            Histogram::new([0.005, 0.025, 0.1, 0.5, 1.0, 5.0, 30.0])
        });
        reg.register_with_unit(
            "request_duration",
            "Histogram of request handling latency",
            Unit::Seconds,
            duration.clone(),
        );

        let in_flight = Family::<Labels, Gauge>::default();
        reg.register(
            "requests_in_flight",
            "Number of requests currently being handled",
            in_flight.clone(),
        );

        let request_size = Family::<Labels, Histogram>::new_with_constructor(size_histogram);
        reg.register_with_unit(
            "request_size",
            "Histogram of request body sizes",
            Unit::Bytes,
            request_size.clone(),
        );

        let response_size = Family::<Labels, Histogram>::new_with_constructor(size_histogram);
        reg.register_with_unit(
            "response_size",
            "Histogram of response body sizes",
            Unit::Bytes,
            response_size.clone(),
        );

        Self {
            requests,
            duration,
            in_flight,
            request_size,
            response_size,
        }
    }

    pub(crate) fn start(
        &self,
        group: &str,
        resource: &str,
        verb: &'static str,
        request_bytes: usize,
    ) -> RequestObserver {
        let labels = Labels {
            group: group.to_string(),
            resource: resource.to_string(),
            verb,
        };
        self.in_flight.get_or_create(&labels).inc();
        self.request_size
            .get_or_create(&labels)
            .observe(request_bytes as f64);
        RequestObserver {
            start: time::Instant::now(),
            labels,
            metrics: self.clone(),
        }
    }
}

// === impl RequestObserver ===

impl RequestObserver {
    pub(crate) fn finish(self, code: u16, response_bytes: usize) {
        let Labels {
            group,
            resource,
            verb,
        } = self.labels.clone();
        self.metrics
            .requests
            .get_or_create(&CodeLabels {
                group,
                resource,
                verb,
                code: code.to_string(),
            })
            .inc();
        self.metrics
            .duration
            .get_or_create(&self.labels)
            .observe(self.start.elapsed().as_secs_f64());
        self.metrics
            .response_size
            .get_or_create(&self.labels)
            .observe(response_bytes as f64);
    }
}

impl Drop for RequestObserver {
    fn drop(&mut self) {
        self.metrics.in_flight.get_or_create(&self.labels).dec();
    }
}

// === impl ReportMetrics ===

impl ReportMetrics {
    pub fn register(reg: &mut Registry, cluster: String) -> Self {
        let metrics = Self {
            cluster,
            snapshot: Default::default(),
        };
        reg.register_collector(Box::new(metrics.clone()));
        metrics
    }

    pub(crate) fn update(&self, snapshot: ReportSnapshot) {
        *self.snapshot.write() = snapshot;
    }

    /// Recomputes the snapshot every interval until shutdown.
    pub async fn refresh(self, renderer: Renderer, interval: Duration, drain: drain::Watch) {
        let shutdown = drain.signaled();
        tokio::pin!(shutdown);
        let mut interval = time::interval(interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => return,
                _ = interval.tick() => {}
            }
            match renderer.report_snapshot().await {
                Ok(snapshot) => {
                    debug!(
                        images = snapshot.image_lineage.len(),
                        violations = snapshot.policy_violations.len(),
                        "Refreshed report metrics"
                    );
                    self.update(snapshot);
                }
                Err(error) => warn!(%error, "Failed to refresh report metrics"),
            }
        }
    }
}

impl Collector for ReportMetrics {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let snapshot = self.snapshot.read();
        let cluster = self.cluster.as_str();

        let mut cves = encoder.encode_descriptor(
            "cve_occurrence",
            "Vulnerabilities found in running images",
            None,
            MetricType::Gauge,
        )?;
        for ((namespace, image, severity), count) in &snapshot.cve_occurrence {
            let labels = [
                ("cluster", cluster),
                ("namespace", namespace.as_str()),
                ("image", image.as_str()),
                ("severity", severity.as_str()),
            ];
            ConstGauge::new(*count as i64).encode(cves.encode_family(&labels)?)?;
        }

        let mut lineage = encoder.encode_descriptor(
            "image_lineage",
            "Workloads running each image",
            None,
            MetricType::Gauge,
        )?;
        for (namespace, image, kind, name) in &snapshot.image_lineage {
            let labels = [
                ("cluster", cluster),
                ("namespace", namespace.as_str()),
                ("image", image.as_str()),
                ("kind", kind.as_str()),
                ("name", name.as_str()),
            ];
            ConstGauge::new(1).encode(lineage.encode_family(&labels)?)?;
        }

        let mut violations = encoder.encode_descriptor(
            "policy_violations",
            "Gatekeeper constraint violations",
            None,
            MetricType::Gauge,
        )?;
        for ((namespace, constraint), count) in &snapshot.policy_violations {
            let labels = [
                ("cluster", cluster),
                ("namespace", namespace.as_str()),
                ("constraint", constraint.as_str()),
            ];
            ConstGauge::new(*count as i64).encode(violations.encode_family(&labels)?)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::{btreemap, btreeset};
    use prometheus_client::encoding::text::encode;

    #[test]
    fn encodes_report_gauges() {
        let mut reg = Registry::default();
        let metrics = ReportMetrics::register(&mut reg, "demo".to_string());
        metrics.update(ReportSnapshot {
            cve_occurrence: btreemap! {
                ("default".into(), "nginx:1.25".into(), "HIGH".into()) => 2,
            },
            image_lineage: btreeset! {
                ("default".into(), "nginx:1.25".into(), "Pod".into(), "web-0".into()),
            },
            policy_violations: btreemap! {
                ("default".into(), "must-have-owner".into()) => 3,
            },
        });

        let mut text = String::new();
        encode(&mut text, &reg).expect("metrics must encode");
        assert!(text.contains(
            r#"cve_occurrence{cluster="demo",namespace="default",image="nginx:1.25",severity="HIGH"} 2"#
        ), "{text}");
        assert!(text.contains(
            r#"image_lineage{cluster="demo",namespace="default",image="nginx:1.25",kind="Pod",name="web-0"} 1"#
        ), "{text}");
        assert!(text.contains(
            r#"policy_violations{cluster="demo",namespace="default",constraint="must-have-owner"} 3"#
        ), "{text}");
    }

    #[test]
    fn tracks_requests_in_flight() {
        let mut reg = Registry::default();
        let metrics = ApiMetrics::register(&mut reg);
        let observer = metrics.start("meta.k8s.appscode.com", "renders", "create", 120);
        let labels = observer.labels.clone();
        assert_eq!(metrics.in_flight.get_or_create(&labels).get(), 1);
        observer.finish(201, 2048);
        assert_eq!(metrics.in_flight.get_or_create(&labels).get(), 0);

        let mut text = String::new();
        encode(&mut text, &reg).expect("metrics must encode");
        assert!(text.contains(
            r#"requests_total{group="meta.k8s.appscode.com",resource="renders",verb="create",code="201"} 1"#
        ), "{text}");
    }
}
