#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use ui_server_core as core;
pub use ui_server_graphql as graphql;
pub use ui_server_k8s_api as k8s;
pub use ui_server_k8s_index as index;
pub use ui_server_k8s_status as status;
pub use ui_server_render as render;

mod apiserver;
mod args;
mod metrics;

pub use self::{
    apiserver::ApiServer,
    args::Args,
    metrics::{ApiMetrics, ReportMetrics},
};
