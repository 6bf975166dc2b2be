//! HTTP transport with Streamable HTTP support for the MCP server.
//!
//! This transport uses HTTP with SSE streaming responses, which is the mode
//! per-user trust modes run in: each request carries the caller's bearer
//! token, and the request parts travel with the tool call.

use crate::auth::{AuthConfig, auth_middleware};
use crate::broker::CatalogBroker;
use crate::error::{DbError, DbResult};
use crate::mcp::CatalogService;
use crate::transport::{Transport, wait_for_signal};
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// HTTP transport implementation with Streamable HTTP support.
pub struct HttpTransport {
    broker: Arc<CatalogBroker>,
    auth: Arc<AuthConfig>,
    /// Host to bind to
    host: String,
    /// Port to bind to
    port: u16,
    /// MCP endpoint path
    endpoint: String,
}

impl HttpTransport {
    pub fn new(
        broker: Arc<CatalogBroker>,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            auth: Arc::new(AuthConfig::disabled()),
            host: host.into(),
            port,
            endpoint: endpoint.into(),
        }
    }

    /// Require one of the configured static bearer tokens on every request.
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the MCP endpoint path.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn router(&self) -> axum::Router {
        let broker = self.broker.clone();
        let service = StreamableHttpService::new(
            move || Ok(CatalogService::new(broker.clone())),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        // nest_service doesn't support root path "/", use fallback_service instead
        let app = if self.endpoint == "/" {
            axum::Router::new().fallback_service(service)
        } else {
            axum::Router::new().nest_service(&self.endpoint, service)
        };

        if self.auth.is_enabled() {
            info!(tokens = self.auth.token_count(), "Bearer token authentication enabled");
            app.layer(axum::middleware::from_fn_with_state(
                self.auth.clone(),
                auth_middleware,
            ))
        } else {
            app
        }
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting MCP server with HTTP transport on {}", bind_addr);

        let app = self.router();

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        info!(endpoint = %self.endpoint, "MCP endpoint ready");

        // SSE connections may keep the server alive indefinitely, so exit
        // after a timeout once shutdown was requested
        const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        self.broker.shutdown().await;
                        return Err(DbError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for connections to close (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        info!("Closing database sessions");
        self.broker.shutdown().await;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::unconnected_broker;
    use crate::models::{Credentials, TrustMode};

    fn transport(host: &str, port: u16, endpoint: &str) -> HttpTransport {
        let broker = unconnected_broker(TrustMode::Local {
            credentials: Credentials::FromUrl,
        });
        HttpTransport::new(broker, host, port, endpoint)
    }

    #[test]
    fn test_http_transport_creation() {
        let transport = transport("127.0.0.1", 8080, "/mcp");
        assert_eq!(transport.name(), "http");
        assert_eq!(transport.bind_addr(), "127.0.0.1:8080");
        assert!(!transport.auth.is_enabled());
    }

    #[test]
    fn test_http_transport_root_endpoint() {
        let transport = transport("0.0.0.0", 3000, "/");
        assert_eq!(transport.endpoint(), "/");
        assert_eq!(transport.bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_http_transport_with_auth() {
        let auth = AuthConfig::from_tokens(vec!["a-long-enough-token".into()]).unwrap();
        let transport = transport("127.0.0.1", 8080, "/mcp").with_auth(auth);
        assert_eq!(transport.auth.token_count(), 1);
    }
}
