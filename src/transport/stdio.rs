//! Stdio transport for the MCP server.
//!
//! Stdio requests carry no bearer token, so this transport only serves
//! trust modes that do not resolve a per-user identity.

use crate::broker::CatalogBroker;
use crate::error::{DbError, DbResult};
use crate::mcp::CatalogService;
use crate::transport::{Transport, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;
use tracing::{info, warn};

pub struct StdioTransport {
    broker: Arc<CatalogBroker>,
}

impl StdioTransport {
    pub fn new(broker: Arc<CatalogBroker>) -> DbResult<Self> {
        let trust_mode = broker.pool().factory().trust_mode();
        if trust_mode.is_per_user() {
            return Err(DbError::config(format!(
                "the {} trust mode needs the caller's token and is only available over the http transport",
                trust_mode.kind()
            )));
        }
        Ok(Self { broker })
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> DbResult<()> {
        info!("Starting MCP server with stdio transport");

        let service = CatalogService::new(self.broker.clone());

        let running_service = service
            .serve(stdio())
            .await
            .map_err(|e| DbError::internal(format!("Failed to start stdio transport: {}", e)))?;

        let shutdown_requested = tokio::select! {
            result = running_service.waiting() => {
                match result {
                    Ok(_quit_reason) => info!("Stdio transport completed normally"),
                    Err(e) => {
                        warn!(error = %e, "Stdio transport error");
                        self.broker.shutdown().await;
                        return Err(DbError::internal(format!("Stdio transport error: {}", e)));
                    }
                }
                false
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received (send again to force exit)");
                true
            }
        };

        if shutdown_requested {
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Received second signal, forcing immediate exit");
                std::process::exit(1);
            });
        }

        info!("Closing database sessions");
        self.broker.shutdown().await;

        if shutdown_requested {
            // A blocking stdin read cannot be interrupted by select!
            info!("Exiting process");
            std::process::exit(0);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}
