pub mod health;
pub mod logs_api;
pub mod metrics_handler;

use crate::logging::LogEngine;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared state for all routes
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LogEngine>,
    pub metrics: Arc<PrometheusHandle>,
}
