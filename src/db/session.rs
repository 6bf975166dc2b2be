//! Database session primitive.
//!
//! The pool and catalog only talk to the database through these two traits,
//! so tests can substitute an in-memory session.

use crate::error::DbResult;
use crate::models::{Credentials, DatabaseType};
use async_trait::async_trait;
use std::collections::HashMap;

/// One result row with every value rendered as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRow {
    values: HashMap<String, Option<String>>,
}

impl CatalogRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: Option<&str>) -> Self {
        self.insert(column, value.map(String::from));
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Option<String>) {
        self.values.insert(column.into(), value);
    }

    /// Non-null value of a column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(|v| v.as_deref())
    }

    /// Value of a column, empty when null or absent.
    pub fn text(&self, column: &str) -> String {
        self.get(column).unwrap_or_default().to_string()
    }

    pub fn opt(&self, column: &str) -> Option<String> {
        self.get(column).map(String::from)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(|v| v.trim().parse().ok())
    }
}

/// An authenticated connection to the database.
#[async_trait]
pub trait DbSession: Send {
    fn dialect(&self) -> DatabaseType;

    /// Run a SELECT with positional string parameters.
    async fn fetch(&mut self, sql: &str, params: &[String]) -> DbResult<Vec<CatalogRow>>;

    /// Run a statement that returns no rows.
    async fn execute(&mut self, sql: &str) -> DbResult<()>;

    /// The user the database resolved this session to.
    async fn current_user(&mut self) -> DbResult<String>;

    async fn ping(&mut self) -> DbResult<()>;

    /// Set after a transport failure; the pool discards broken sessions.
    fn is_broken(&self) -> bool;

    async fn close(&mut self);
}

/// Opens sessions with given credentials.
#[async_trait]
pub trait Connector: Send + Sync {
    fn dialect(&self) -> DatabaseType;

    async fn open(&self, credentials: &Credentials) -> DbResult<Box<dyn DbSession>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_row_accessors() {
        let row = CatalogRow::new()
            .with("object_name", Some("ORDERS"))
            .with("object_comment", None)
            .with("ordinal", Some(" 3"));
        assert_eq!(row.get("object_name"), Some("ORDERS"));
        assert_eq!(row.get("object_comment"), None);
        assert_eq!(row.text("object_comment"), "");
        assert_eq!(row.text("missing"), "");
        assert_eq!(row.get_i64("ordinal"), Some(3));
        assert_eq!(row.get_i64("object_name"), None);
    }
}
