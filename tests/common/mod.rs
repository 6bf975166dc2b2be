//! In-memory connector used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use catalog_mcp_server::broker::CatalogBroker;
use catalog_mcp_server::catalog::{MetadataCatalog, QueryBuilder};
use catalog_mcp_server::config::PoolOptions;
use catalog_mcp_server::db::{CatalogRow, ConnectionFactory, Connector, DbSession, SessionPool};
use catalog_mcp_server::error::{DbError, DbResult};
use catalog_mcp_server::models::{CatalogSettings, Credentials, DatabaseType, Secret, TrustMode};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MockState {
    /// Credentials of every successful open, in order
    pub opened: Vec<Credentials>,
    /// Connect attempts, failed ones included
    pub connect_attempts: usize,
    pub closed: usize,
    /// Statements passed to `execute`
    pub executed: Vec<String>,
    /// Queries passed to `fetch`
    pub fetched: Vec<String>,
    /// Upcoming connects that fail with a transport error
    pub failing_connects: usize,
    /// Upcoming fetches that fail with a transport error
    pub failing_fetches: usize,
    /// Overrides the user the database reports
    pub resolved_user: Option<String>,
    /// Reject `SET ROLE` with an insufficient-privilege error
    pub deny_roles: bool,
    /// Access tokens the database refuses at login
    pub rejected_tokens: Vec<String>,
    /// Time every connect takes before it resolves
    pub connect_delay: Option<Duration>,
    /// Rows returned by every fetch
    pub rows: Vec<CatalogRow>,
}

#[derive(Clone)]
pub struct MockConnector {
    pub dialect: DatabaseType,
    pub state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new(dialect: DatabaseType) -> Self {
        Self {
            dialect,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    async fn open(&self, credentials: &Credentials) -> DbResult<Box<dyn DbSession>> {
        let delay = self.state().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.connect_attempts += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(DbError::connection("connection refused", "Is the database up?"));
        }
        if let Credentials::Login {
            secret: Secret::AccessToken(token),
            ..
        } = credentials
        {
            if state.rejected_tokens.contains(token) {
                return Err(DbError::auth("token authentication failed"));
            }
        }
        state.opened.push(credentials.clone());
        let user = credentials.username().unwrap_or("service").to_string();
        Ok(Box::new(MockSession {
            dialect: self.dialect,
            user,
            state: Arc::clone(&self.state),
            broken: false,
        }))
    }
}

pub struct MockSession {
    dialect: DatabaseType,
    user: String,
    state: Arc<Mutex<MockState>>,
    broken: bool,
}

#[async_trait]
impl DbSession for MockSession {
    fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    async fn fetch(&mut self, sql: &str, _params: &[String]) -> DbResult<Vec<CatalogRow>> {
        let mut state = self.state.lock().unwrap();
        state.fetched.push(sql.to_string());
        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            self.broken = true;
            return Err(DbError::connection("connection reset by peer", "Retry"));
        }
        Ok(state.rows.clone())
    }

    async fn execute(&mut self, sql: &str) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        state.executed.push(sql.to_string());
        if state.deny_roles && sql.starts_with("SET ROLE") {
            return Err(DbError::query(
                "permission denied to set role",
                Some("42501".to_string()),
                "Grant the role to the service user",
            ));
        }
        Ok(())
    }

    async fn current_user(&mut self) -> DbResult<String> {
        let state = self.state.lock().unwrap();
        Ok(state.resolved_user.clone().unwrap_or_else(|| self.user.clone()))
    }

    async fn ping(&mut self) -> DbResult<()> {
        if self.broken {
            return Err(DbError::connection("connection closed", "Retry"));
        }
        Ok(())
    }

    fn is_broken(&self) -> bool {
        self.broken
    }

    async fn close(&mut self) {
        self.state.lock().unwrap().closed += 1;
    }
}

pub fn pool_with(connector: &MockConnector, trust_mode: TrustMode, options: PoolOptions) -> SessionPool {
    let factory = ConnectionFactory::new(Arc::new(connector.clone()), trust_mode)
        .with_retry_backoff(Duration::from_millis(1));
    SessionPool::new(factory, options)
}

pub fn broker_with(
    connector: &MockConnector,
    trust_mode: TrustMode,
    options: PoolOptions,
    settings: CatalogSettings,
) -> CatalogBroker {
    let pool = pool_with(connector, trust_mode, options);
    let builder = QueryBuilder::new(connector.dialect, settings.case_sensitive);
    let catalog = MetadataCatalog::new(builder, Arc::new(settings));
    CatalogBroker::new(pool, catalog, Duration::from_secs(300)).unwrap()
}

pub fn object_row(schema: &str, name: &str) -> CatalogRow {
    CatalogRow::new()
        .with("schema_name", Some(schema))
        .with("object_name", Some(name))
        .with("object_comment", None)
}

pub fn local() -> TrustMode {
    TrustMode::Local {
        credentials: Credentials::FromUrl,
    }
}

pub fn impersonation(pool_size: usize) -> TrustMode {
    TrustMode::Impersonation {
        credentials: Credentials::FromUrl,
        username_claim: "preferred_username".to_string(),
        pool_size,
    }
}

pub fn passthrough(pool_size: usize) -> TrustMode {
    TrustMode::Passthrough {
        username_claim: "sub".to_string(),
        pool_size,
    }
}
