//! Catalog browsing tools.
//!
//! This module implements the `list_objects` and `describe_object` MCP tools.

use crate::broker::{CatalogBroker, FilterOverrides};
use crate::error::{DbError, DbResult};
use crate::identity::Identity;
use crate::models::{CatalogEntry, ChildEntry, ObjectKind, QualifiedName};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Upper bound on entries returned by one listing.
pub const DEFAULT_LIST_LIMIT: usize = 500;

/// Input for the list_objects tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListObjectsInput {
    /// Object kind: schema, table, view, function or script
    pub kind: ObjectKind,
    /// Only objects in this schema. Exact match.
    #[serde(default)]
    pub schema: Option<String>,
    /// SQL LIKE pattern on the object name, e.g. `CUST%`. Applied on top of the server's own patterns.
    #[serde(default)]
    pub like_pattern: Option<String>,
    /// Regular expression the whole object name must match, e.g. `CUST.*`. Applied on top of the server's own patterns.
    #[serde(default)]
    pub regexp_pattern: Option<String>,
    /// Maximum number of entries. Default: 500
    #[serde(default)]
    pub limit: Option<usize>,
}

/// One entry of a listing.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ObjectSummary {
    pub kind: ObjectKind,
    pub schema: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
}

impl From<CatalogEntry> for ObjectSummary {
    fn from(entry: CatalogEntry) -> Self {
        Self {
            kind: entry.kind,
            schema: entry.schema_name,
            name: entry.object_name,
            comment: entry.comment,
            return_type: entry.return_type,
        }
    }
}

/// Output from the list_objects tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListObjectsOutput {
    pub objects: Vec<ObjectSummary>,
    /// Number of entries returned
    pub count: usize,
    /// True when more entries matched than `limit`
    pub truncated: bool,
}

/// Input for the describe_object tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DescribeObjectInput {
    /// Object kind: schema, table, view, function or script
    pub kind: ObjectKind,
    /// Object name, optionally schema-qualified (`sales.orders`, `"My Schema"."Order"`)
    pub name: String,
}

/// Output from the describe_object tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DescribeObjectOutput {
    pub kind: ObjectKind,
    pub schema: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    /// Columns of tables and views
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ChildEntry>,
    /// Parameters of functions and scripts
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ChildEntry>,
}

impl From<CatalogEntry> for DescribeObjectOutput {
    fn from(entry: CatalogEntry) -> Self {
        let (columns, parameters) = if entry.kind.has_parameters() {
            (Vec::new(), entry.children)
        } else {
            (entry.children, Vec::new())
        };
        Self {
            kind: entry.kind,
            schema: entry.schema_name,
            name: entry.object_name,
            comment: entry.comment,
            return_type: entry.return_type,
            columns,
            parameters,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub struct CatalogToolHandler {
    broker: Arc<CatalogBroker>,
}

impl CatalogToolHandler {
    pub fn new(broker: Arc<CatalogBroker>) -> Self {
        Self { broker }
    }

    pub async fn list_objects(
        &self,
        identity: Option<&Identity>,
        input: ListObjectsInput,
    ) -> DbResult<ListObjectsOutput> {
        let limit = input.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        if limit == 0 {
            return Err(DbError::invalid_input("limit must be at least 1"));
        }

        let overrides = FilterOverrides {
            like_pattern: non_blank(input.like_pattern),
            regexp_pattern: non_blank(input.regexp_pattern),
        };
        let overrides = (!overrides.is_empty()).then_some(overrides);
        let schema = non_blank(input.schema);

        let listing = self
            .broker
            .list_objects(identity, input.kind, overrides.as_ref(), schema.as_deref())
            .await?;
        let total = listing.len();
        let objects: Vec<ObjectSummary> = listing.take(limit).map(Into::into).collect();
        let count = objects.len();

        info!(kind = %input.kind, count, total, "Listed objects");

        Ok(ListObjectsOutput {
            objects,
            count,
            truncated: total > count,
        })
    }

    pub async fn describe_object(
        &self,
        identity: Option<&Identity>,
        input: DescribeObjectInput,
    ) -> DbResult<DescribeObjectOutput> {
        let name = QualifiedName::parse(&input.name)?;
        let entry = self.broker.describe(identity, input.kind, &name).await?;

        info!(
            kind = %input.kind,
            name = %entry.qualified_name(),
            children = entry.children.len(),
            "Described object"
        );

        Ok(entry.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_input_deserialize_defaults() {
        let input: ListObjectsInput = serde_json::from_str(r#"{"kind":"table"}"#).unwrap();
        assert_eq!(input.kind, ObjectKind::Table);
        assert!(input.schema.is_none());
        assert!(input.like_pattern.is_none());
        assert!(input.limit.is_none());
    }

    #[test]
    fn test_list_input_rejects_unknown_kind() {
        assert!(serde_json::from_str::<ListObjectsInput>(r#"{"kind":"index"}"#).is_err());
    }

    #[test]
    fn test_describe_output_splits_children() {
        let function = CatalogEntry::new(ObjectKind::Function, "public", "total")
            .with_children(vec![ChildEntry::new("p_id", "integer", 1)]);
        let output = DescribeObjectOutput::from(function);
        assert!(output.columns.is_empty());
        assert_eq!(output.parameters.len(), 1);

        let table = CatalogEntry::new(ObjectKind::Table, "public", "orders")
            .with_children(vec![ChildEntry::new("id", "integer", 1)]);
        let output = DescribeObjectOutput::from(table);
        assert_eq!(output.columns.len(), 1);
        assert!(output.parameters.is_empty());
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(Some("a".into())), Some("a".into()));
        assert_eq!(non_blank(None), None);
    }
}
