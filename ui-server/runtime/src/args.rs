use crate::{
    apiserver::ApiServer,
    index::{
        self, discovery::ApiDiscovery, reconciler, Catalog, Evaluator, KubeCluster, RuleSet,
        SharedCluster,
    },
    metrics::{ApiMetrics, ReportMetrics},
    render::{Config, KubeAuthorizer, Renderer},
    status::{ClaimController, ClusterStatusPoller, FeatureController, FeatureEvaluator},
};
use anyhow::{bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::{path::PathBuf, sync::Arc};
use tokio::{
    sync::{mpsc, Notify},
    time::Duration,
};
use tracing::{info, info_span, Instrument};
use ui_server_core::ObjectGraph;

// Newly discovered types are buffered while reconcilers start.
const DISCOVERY_QUEUE_SIZE: usize = 256;

const REPORT_REFRESH_PERIOD: Duration = Duration::from_secs(300);

#[derive(Debug, Parser)]
#[clap(
    name = "ui-server",
    about = "Serves virtual resources describing a cluster's object graph"
)]
pub struct Args {
    #[clap(long, default_value = "ui_server=info,warn", env = "UI_SERVER_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Reported in cluster identity, summaries and report metrics.
    #[clap(long, default_value = "default")]
    cluster_name: String,

    #[clap(long, default_value = "60")]
    discovery_interval_secs: u64,

    #[clap(long, default_value = "120")]
    cluster_status_interval_secs: u64,

    /// A directory of descriptor, layout and dashboard documents merged over the embedded set.
    #[clap(long)]
    descriptors_dir: Option<PathBuf>,

    /// Feature sets that must be ready for the cluster to be active.
    #[clap(long, default_value = "opscenter-core", value_delimiter = ',')]
    required_feature_sets: Vec<String>,

    /// Disables the feature controller and the features cluster claim.
    #[clap(long)]
    feature_controller_disabled: bool,

    #[clap(long, default_value = "1024")]
    image_cache_size: u64,

    #[clap(long, default_value = "300")]
    image_cache_ttl_secs: u64,

    #[clap(long)]
    grafana_url: Option<url::Url>,

    #[clap(long, default_value = "8")]
    graphql_max_depth: usize,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            server,
            admin,
            cluster_name,
            discovery_interval_secs,
            cluster_status_interval_secs,
            descriptors_dir,
            required_feature_sets,
            feature_controller_disabled,
            image_cache_size,
            image_cache_ttl_secs,
            grafana_url,
            graphql_max_depth,
        } = self;

        let mut catalog = Catalog::embedded()?;
        if let Some(dir) = &descriptors_dir {
            catalog.load_dir(dir)?;
            info!(dir = %dir.display(), "Loaded descriptors");
        }
        let rules = Arc::new(RuleSet::from_descriptors(catalog.descriptors()));
        let catalog = Arc::new(catalog);

        let graph = ObjectGraph::shared();
        let registry = index::Registry::shared();

        let mut prom = <Registry>::default();
        let graph_metrics = prom.sub_registry_with_prefix("graph");
        index::metrics::register(graph_metrics, graph.clone(), registry.clone());
        let reconcile_metrics = index::metrics::ReconcileMetrics::register(graph_metrics);
        let api_metrics = ApiMetrics::register(prom.sub_registry_with_prefix("apiserver"));
        let report_metrics = ReportMetrics::register(&mut prom, cluster_name.clone());
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_server(server)
            .build()
            .await?;

        let client = runtime.client();
        let cluster: SharedCluster = Arc::new(KubeCluster::new(client.clone()));

        // Discovery announces each served type; a reconciler is started for every type that
        // participates in a connection rule.
        let (types_tx, types_rx) = mpsc::channel(DISCOVERY_QUEUE_SIZE);
        let discovery = ApiDiscovery::new(
            client.clone(),
            registry.clone(),
            graph.clone(),
            Duration::from_secs(discovery_interval_secs),
        );
        tokio::spawn(
            discovery
                .run(types_tx, runtime.shutdown_handle())
                .instrument(info_span!("discovery")),
        );
        let evaluator = Arc::new(Evaluator::new(cluster.clone(), registry.clone()));
        tokio::spawn(
            reconciler::run_all(
                types_rx,
                client.clone(),
                rules,
                evaluator,
                graph.clone(),
                reconcile_metrics,
                runtime.shutdown_handle(),
            )
            .instrument(info_span!("reconcilers")),
        );

        let poller = ClusterStatusPoller::new(
            cluster.clone(),
            registry.clone(),
            required_feature_sets,
            Duration::from_secs(cluster_status_interval_secs),
        );
        let status = poller.status();
        tokio::spawn(
            poller
                .run(runtime.shutdown_handle())
                .instrument(info_span!("cluster_status")),
        );

        if feature_controller_disabled {
            info!("Feature controller disabled");
        } else {
            let claims = Arc::new(Notify::new());
            let features = FeatureController::new(
                client.clone(),
                FeatureEvaluator::new(cluster.clone(), registry.clone()),
                claims.clone(),
            );
            tokio::spawn(
                features
                    .run(runtime.shutdown_handle())
                    .instrument(info_span!("features")),
            );
            let claim = ClaimController::new(client.clone(), registry.clone(), claims);
            tokio::spawn(
                claim
                    .run(runtime.shutdown_handle())
                    .instrument(info_span!("cluster_claim")),
            );
        }

        let renderer = Renderer::new(
            Config {
                cluster_name,
                grafana_url,
                max_depth: graphql_max_depth,
                image_cache_size,
                image_cache_ttl: Duration::from_secs(image_cache_ttl_secs),
            },
            cluster,
            registry,
            graph,
            catalog,
            Arc::new(KubeAuthorizer::new(client)),
        );
        tokio::spawn(
            report_metrics
                .refresh(
                    renderer.clone(),
                    REPORT_REFRESH_PERIOD,
                    runtime.shutdown_handle(),
                )
                .instrument(info_span!("report_metrics")),
        );

        let api = ApiServer::new(renderer, status, api_metrics);
        let runtime = runtime.spawn_server(api);

        // Block the main thread on the shutdown signal. Once it fires, wait for the background
        // tasks to complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
