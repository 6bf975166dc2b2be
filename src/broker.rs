//! Catalog broker: the entry point collaborators call.
//!
//! Every operation borrows the caller's session from the pool, runs against
//! it and hands it back. A session that fails with a transport error is
//! discarded and the operation is retried on a fresh one, up to the
//! configured reconnect budget.

use crate::catalog::{MetadataCatalog, ObjectListing};
use crate::db::pool::{PoolStats, ScopedSession, SessionPool};
use crate::error::{DbError, DbResult};
use crate::identity::{AuthContext, Identity, IdentityKey, IdentityResolver};
use crate::models::{
    CatalogEntry, CatalogSettings, DatabaseType, ObjectFilter, ObjectKind, QualifiedName,
    TrustModeKind,
};
use crate::search::{Normalizer, SearchHit, SearchIndex};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Caller-supplied patterns that narrow the configured ones for one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOverrides {
    pub like_pattern: Option<String>,
    pub regexp_pattern: Option<String>,
}

impl FilterOverrides {
    pub fn is_empty(&self) -> bool {
        self.like_pattern.is_none() && self.regexp_pattern.is_none()
    }

    fn to_filter(&self) -> ObjectFilter {
        ObjectFilter {
            enable: true,
            like_pattern: self.like_pattern.clone(),
            regexp_pattern: self.regexp_pattern.clone(),
        }
    }
}

/// Result of a health probe.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct HealthReport {
    pub healthy: bool,
    pub database_type: DatabaseType,
    pub trust_mode: TrustModeKind,
    /// Pool key the probe ran under
    pub identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_user: Option<String>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub pool: PoolStats,
}

/// Summary of an index rebuild.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct IndexSummary {
    pub identity: String,
    pub documents: usize,
    pub elapsed_ms: u64,
    #[schemars(with = "String")]
    pub built_at: DateTime<Utc>,
}

struct Snapshot {
    index: Arc<SearchIndex>,
    built_at: Instant,
}

enum Attempt<T> {
    Done(DbResult<T>),
    Retry,
}

pub struct CatalogBroker {
    pool: SessionPool,
    catalog: MetadataCatalog,
    normalizer: Normalizer,
    index_ttl: Duration,
    max_reconnects: u32,
    snapshots: RwLock<HashMap<IdentityKey, Snapshot>>,
}

impl std::fmt::Debug for CatalogBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogBroker")
            .field("pool", &self.pool)
            .field("index_ttl", &self.index_ttl)
            .field("max_reconnects", &self.max_reconnects)
            .finish_non_exhaustive()
    }
}

impl CatalogBroker {
    pub fn new(pool: SessionPool, catalog: MetadataCatalog, index_ttl: Duration) -> DbResult<Self> {
        let settings = catalog.settings();
        let normalizer = Normalizer::new(settings.case_sensitive, settings.language()?);
        let max_reconnects = pool.options().max_reconnects_or_default();
        Ok(Self {
            pool,
            catalog,
            normalizer,
            index_ttl,
            max_reconnects,
            snapshots: RwLock::new(HashMap::new()),
        })
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    pub fn settings(&self) -> &CatalogSettings {
        self.catalog.settings()
    }

    pub fn resolve_identity(&self, auth: Option<&AuthContext>) -> DbResult<Option<Identity>> {
        IdentityResolver::resolve(auth, self.pool.factory().trust_mode().username_claim())
    }

    pub async fn acquire_connection(&self, identity: Option<&Identity>) -> DbResult<ScopedSession> {
        self.pool.acquire(identity).await
    }

    /// Hand the session back and decide whether the operation runs again.
    async fn settle<T>(
        &self,
        scoped: ScopedSession,
        result: DbResult<T>,
        reconnects: &mut u32,
    ) -> Attempt<T> {
        match result {
            Ok(value) => {
                scoped.release(true).await;
                Attempt::Done(Ok(value))
            }
            Err(e) if e.is_connection() => {
                let key = scoped.key().clone();
                scoped.release(false).await;
                if *reconnects >= self.max_reconnects {
                    warn!(key = %key, error = %e, "Reconnect budget spent");
                    return Attempt::Done(Err(e));
                }
                *reconnects += 1;
                warn!(key = %key, error = %e, attempt = *reconnects, "Session failed, reconnecting");
                Attempt::Retry
            }
            Err(e) => {
                // Query and authorization errors leave the session usable
                scoped.release(true).await;
                Attempt::Done(Err(e))
            }
        }
    }

    pub async fn list_objects(
        &self,
        identity: Option<&Identity>,
        kind: ObjectKind,
        overrides: Option<&FilterOverrides>,
        schema: Option<&str>,
    ) -> DbResult<ObjectListing> {
        let narrowing = overrides.filter(|o| !o.is_empty()).map(FilterOverrides::to_filter);

        let mut reconnects = 0;
        loop {
            let mut scoped = self.pool.acquire(identity).await?;
            let result = self
                .catalog
                .list_objects(scoped.session(), kind, narrowing.as_ref(), schema)
                .await;
            match self.settle(scoped, result, &mut reconnects).await {
                Attempt::Done(result) => return result,
                Attempt::Retry => continue,
            }
        }
    }

    pub async fn describe(
        &self,
        identity: Option<&Identity>,
        kind: ObjectKind,
        name: &QualifiedName,
    ) -> DbResult<CatalogEntry> {
        let mut reconnects = 0;
        loop {
            let mut scoped = self.pool.acquire(identity).await?;
            let result = self.catalog.describe(scoped.session(), kind, name).await;
            match self.settle(scoped, result, &mut reconnects).await {
                Attempt::Done(result) => return result,
                Attempt::Retry => continue,
            }
        }
    }

    async fn build_index(&self, identity: Option<&Identity>) -> DbResult<Arc<SearchIndex>> {
        let mut reconnects = 0;
        let entries = loop {
            let mut scoped = self.pool.acquire(identity).await?;
            let result = self.catalog.list_all(scoped.session()).await;
            match self.settle(scoped, result, &mut reconnects).await {
                Attempt::Done(result) => break result?,
                Attempt::Retry => continue,
            }
        };
        Ok(Arc::new(SearchIndex::build(entries, self.normalizer)))
    }

    fn store_snapshot(&self, key: IdentityKey, index: Arc<SearchIndex>) -> DbResult<()> {
        let mut snapshots = self
            .snapshots
            .write()
            .map_err(|_| DbError::internal("search index lock poisoned"))?;
        snapshots.insert(
            key,
            Snapshot {
                index,
                built_at: Instant::now(),
            },
        );
        Ok(())
    }

    fn fresh_snapshot(&self, key: &IdentityKey) -> DbResult<Option<Arc<SearchIndex>>> {
        let snapshots = self
            .snapshots
            .read()
            .map_err(|_| DbError::internal("search index lock poisoned"))?;
        Ok(snapshots
            .get(key)
            .filter(|s| s.built_at.elapsed() < self.index_ttl)
            .map(|s| Arc::clone(&s.index)))
    }

    async fn index_for(&self, identity: Option<&Identity>) -> DbResult<Arc<SearchIndex>> {
        let key = self.pool.factory().key_for(identity)?;
        if let Some(index) = self.fresh_snapshot(&key)? {
            return Ok(index);
        }
        debug!(key = %key, "Building search index");
        let index = self.build_index(identity).await?;
        self.store_snapshot(key, Arc::clone(&index))?;
        Ok(index)
    }

    /// Rank objects visible to the caller against a keyword query.
    pub async fn search(
        &self,
        identity: Option<&Identity>,
        query: &str,
        kind: Option<ObjectKind>,
        top_k: usize,
    ) -> DbResult<Vec<SearchHit>> {
        if let Some(kind) = kind.filter(|k| !self.catalog.settings().is_enabled(*k)) {
            return Err(DbError::kind_disabled(kind.as_str()));
        }
        let index = self.index_for(identity).await?;
        Ok(index.search(query, kind, top_k))
    }

    /// Rebuild the caller's index now.
    pub async fn refresh_index(&self, identity: Option<&Identity>) -> DbResult<IndexSummary> {
        let key = self.pool.factory().key_for(identity)?;
        let started = Instant::now();
        let index = self.build_index(identity).await?;
        let documents = index.len();
        self.store_snapshot(key.clone(), index)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(key = %key, documents, elapsed_ms, "Search index rebuilt");
        Ok(IndexSummary {
            identity: key.to_string(),
            documents,
            elapsed_ms,
            built_at: Utc::now(),
        })
    }

    /// Probe the caller's session. Connection failures are reported in the
    /// result; identity and authorization failures are returned as errors.
    pub async fn health(&self, identity: Option<&Identity>) -> DbResult<HealthReport> {
        let factory = self.pool.factory();
        let key = factory.key_for(identity)?;
        let started = Instant::now();

        let probe = async {
            let mut scoped = self.pool.acquire(identity).await?;
            let result = async {
                scoped.session().ping().await?;
                scoped.session().current_user().await
            }
            .await;
            let healthy = !result.as_ref().is_err_and(DbError::is_connection);
            scoped.release(healthy).await;
            result
        }
        .await;

        let (healthy, database_user, error) = match probe {
            Ok(user) => (true, Some(user).filter(|u| !u.is_empty()), None),
            Err(e) if e.is_retryable() => (false, None, Some(e.to_string())),
            Err(e) => return Err(e),
        };

        Ok(HealthReport {
            healthy,
            database_type: factory.dialect(),
            trust_mode: factory.trust_mode().kind(),
            identity: key.to_string(),
            database_user,
            latency_ms: started.elapsed().as_millis() as u64,
            error,
            pool: self.pool.stats(),
        })
    }

    /// Close every pooled session and drop all index snapshots.
    pub async fn shutdown(&self) {
        self.pool.close_all().await;
        if let Ok(mut snapshots) = self.snapshots.write() {
            snapshots.clear();
        }
        info!("Catalog broker shut down");
    }
}

/// Broker over a PostgreSQL URL that is never dialed unless a tool runs.
#[cfg(test)]
pub(crate) fn unconnected_broker(trust_mode: crate::models::TrustMode) -> Arc<CatalogBroker> {
    use crate::catalog::QueryBuilder;
    use crate::config::PoolOptions;
    use crate::db::{ConnectionFactory, SqlxConnector};

    let connector = SqlxConnector::new("postgres://localhost:1/none", DatabaseType::PostgreSQL);
    let factory = ConnectionFactory::new(Arc::new(connector), trust_mode);
    let pool = SessionPool::new(factory, PoolOptions::default());
    let settings = Arc::new(CatalogSettings::default());
    let catalog = MetadataCatalog::new(QueryBuilder::new(DatabaseType::PostgreSQL, false), settings);
    let broker = CatalogBroker::new(pool, catalog, Duration::from_secs(60))
        .expect("default settings are valid");
    Arc::new(broker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Credentials, TrustMode};

    #[test]
    fn test_filter_overrides_is_empty() {
        assert!(FilterOverrides::default().is_empty());
        let overrides = FilterOverrides {
            like_pattern: Some("CUST%".into()),
            regexp_pattern: None,
        };
        assert!(!overrides.is_empty());
    }

    #[test]
    fn test_unknown_language_rejected() {
        let connector = crate::db::SqlxConnector::new("sqlite:x.db", DatabaseType::SQLite);
        let factory = crate::db::ConnectionFactory::new(
            Arc::new(connector),
            TrustMode::Local {
                credentials: Credentials::FromUrl,
            },
        );
        let pool = SessionPool::new(factory, Default::default());
        let settings = CatalogSettings {
            language: "klingon".into(),
            ..Default::default()
        };
        let catalog = MetadataCatalog::new(
            crate::catalog::QueryBuilder::new(DatabaseType::SQLite, false),
            Arc::new(settings),
        );
        let err = CatalogBroker::new(pool, catalog, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DbError::Config { .. }));
    }

    #[test]
    fn test_resolve_identity_shared_mode() {
        let broker = unconnected_broker(TrustMode::Local {
            credentials: Credentials::FromUrl,
        });
        assert!(broker.resolve_identity(None).unwrap().is_none());
    }
}
