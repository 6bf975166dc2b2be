//! Keyword search tools.
//!
//! This module implements the `find_objects` and `refresh_index` MCP tools.

use crate::broker::{CatalogBroker, IndexSummary};
use crate::error::{DbError, DbResult};
use crate::identity::Identity;
use crate::models::ObjectKind;
use crate::search::SearchHit;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_TOP_K: usize = 10;
pub const MAX_TOP_K: usize = 100;

/// Input for the find_objects tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FindObjectsInput {
    /// Keywords describing the objects, e.g. "customer orders"
    pub query: String,
    /// Restrict results to one object kind
    #[serde(default)]
    pub kind: Option<ObjectKind>,
    /// Maximum number of results (1-100). Default: 10
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct FoundObject {
    pub kind: ObjectKind,
    pub schema: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// BM25 relevance, higher is better
    pub score: f64,
}

impl From<SearchHit> for FoundObject {
    fn from(hit: SearchHit) -> Self {
        Self {
            kind: hit.entry.kind,
            schema: hit.entry.schema_name,
            name: hit.entry.object_name,
            comment: hit.entry.comment,
            score: hit.score,
        }
    }
}

/// Output from the find_objects tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct FindObjectsOutput {
    pub results: Vec<FoundObject>,
    pub count: usize,
}

/// Output from the refresh_index tool.
pub type RefreshIndexOutput = IndexSummary;

pub struct SearchToolHandler {
    broker: Arc<CatalogBroker>,
}

impl SearchToolHandler {
    pub fn new(broker: Arc<CatalogBroker>) -> Self {
        Self { broker }
    }

    pub async fn find_objects(
        &self,
        identity: Option<&Identity>,
        input: FindObjectsInput,
    ) -> DbResult<FindObjectsOutput> {
        let top_k = input.top_k.unwrap_or(DEFAULT_TOP_K);
        if !(1..=MAX_TOP_K).contains(&top_k) {
            return Err(DbError::invalid_input(format!(
                "top_k must be between 1 and {}",
                MAX_TOP_K
            )));
        }
        if input.query.trim().is_empty() {
            return Err(DbError::invalid_input("query must not be empty"));
        }

        let hits = self
            .broker
            .search(identity, &input.query, input.kind, top_k)
            .await?;
        let results: Vec<FoundObject> = hits.into_iter().map(Into::into).collect();
        let count = results.len();

        info!(query = %input.query, count, "Searched catalog");

        Ok(FindObjectsOutput { results, count })
    }

    pub async fn refresh_index(&self, identity: Option<&Identity>) -> DbResult<RefreshIndexOutput> {
        self.broker.refresh_index(identity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_input_deserialize() {
        let input: FindObjectsInput =
            serde_json::from_str(r#"{"query":"customer orders","kind":"view","top_k":3}"#).unwrap();
        assert_eq!(input.kind, Some(ObjectKind::View));
        assert_eq!(input.top_k, Some(3));

        let input: FindObjectsInput = serde_json::from_str(r#"{"query":"orders"}"#).unwrap();
        assert!(input.kind.is_none());
        assert!(input.top_k.is_none());
    }
}
