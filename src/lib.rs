pub mod api;
pub mod commerce;
pub mod config;
pub mod db;
pub mod notifications;
pub mod payments;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::notifications::EmailSender;
use crate::payments::PaymentGateway;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub mailer: Arc<dyn EmailSender>,
    pub payments: Arc<dyn PaymentGateway>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: DbPool,
        mailer: Arc<dyn EmailSender>,
        payments: Arc<dyn PaymentGateway>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(
            &config.rate_limit,
            config.server.environment,
        ));
        Self {
            config,
            db,
            mailer,
            payments,
            rate_limiter,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
