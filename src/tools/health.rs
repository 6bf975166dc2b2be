//! Connectivity check tool.

use crate::broker::{CatalogBroker, HealthReport};
use crate::error::DbResult;
use crate::identity::Identity;
use std::sync::Arc;
use tracing::{info, warn};

pub type HealthCheckOutput = HealthReport;

pub struct HealthToolHandler {
    broker: Arc<CatalogBroker>,
}

impl HealthToolHandler {
    pub fn new(broker: Arc<CatalogBroker>) -> Self {
        Self { broker }
    }

    pub async fn health_check(&self, identity: Option<&Identity>) -> DbResult<HealthCheckOutput> {
        let report = self.broker.health(identity).await?;
        if report.healthy {
            info!(identity = %report.identity, latency_ms = report.latency_ms, "Health check passed");
        } else {
            warn!(identity = %report.identity, error = ?report.error, "Health check failed");
        }
        Ok(report)
    }
}
