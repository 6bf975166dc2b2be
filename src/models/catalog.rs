//! Catalog data models.
//!
//! Entries are plain values: foreign keys point at other objects by name
//! and are never followed as references.

use crate::error::{DbError, DbResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of database object exposed by the catalog.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Schema,
    Table,
    View,
    Function,
    Script,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 5] = [
        Self::Schema,
        Self::Table,
        Self::View,
        Self::Function,
        Self::Script,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Table => "table",
            Self::View => "view",
            Self::Function => "function",
            Self::Script => "script",
        }
    }

    /// Kinds whose entries carry columns.
    pub fn has_columns(&self) -> bool {
        matches!(self, Self::Table | Self::View)
    }

    /// Kinds whose entries carry parameters.
    pub fn has_parameters(&self) -> bool {
        matches!(self, Self::Function | Self::Script)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().trim_end_matches('s') {
            "schema" => Ok(Self::Schema),
            "table" => Ok(Self::Table),
            "view" => Ok(Self::View),
            "function" => Ok(Self::Function),
            "script" => Ok(Self::Script),
            _ => Err(DbError::invalid_input(format!(
                "Unknown object kind '{}'. Expected one of: schema, table, view, function, script",
                s
            ))),
        }
    }
}

/// A possibly schema-qualified object name such as `sales.orders` or
/// `"My Schema"."Order.Lines"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    pub schema: Option<String>,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: Option<String>, name: impl Into<String>) -> Self {
        Self {
            schema,
            name: name.into(),
        }
    }

    /// Parse a dotted name. Double-quoted parts may contain dots; `""` inside
    /// quotes is a literal quote.
    pub fn parse(input: &str) -> DbResult<Self> {
        let mut parts: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut chars = input.trim().chars().peekable();
        let mut in_quotes = false;

        while let Some(c) = chars.next() {
            match c {
                '"' if in_quotes && chars.peek() == Some(&'"') => {
                    chars.next();
                    current.push('"');
                }
                '"' => in_quotes = !in_quotes,
                '.' if !in_quotes => parts.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
        if in_quotes {
            return Err(DbError::invalid_input(format!(
                "Unterminated quote in object name: {}",
                input
            )));
        }
        parts.push(current);

        if parts.iter().any(|p| p.is_empty()) {
            return Err(DbError::invalid_input(format!(
                "Invalid object name: '{}'",
                input
            )));
        }
        match parts.len() {
            1 => Ok(Self::new(None, parts.remove(0))),
            2 => {
                let name = parts.remove(1);
                Ok(Self::new(Some(parts.remove(0)), name))
            }
            _ => Err(DbError::invalid_input(format!(
                "Object name must be 'name' or 'schema.name', got '{}'",
                input
            ))),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// How a foreign key target was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Resolution {
    /// The referenced column exists; its type is known.
    Resolved { data_type: String },
    /// Only the referenced name is known.
    NameOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ForeignKeyRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    pub schema: String,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub resolution: Resolution,
}

impl ForeignKeyRef {
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// A column of a table/view or a parameter of a function/script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ChildEntry {
    pub name: String,
    pub data_type: String,
    pub ordinal: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Parameter direction (IN, OUT, INOUT)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKeyRef>,
}

impl ChildEntry {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, ordinal: i64) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            ordinal,
            comment: None,
            mode: None,
            foreign_keys: Vec::new(),
        }
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment.filter(|c| !c.is_empty());
        self
    }

    pub fn with_mode(mut self, mode: Option<String>) -> Self {
        self.mode = mode;
        self
    }
}

/// One catalog object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct CatalogEntry {
    pub kind: ObjectKind,
    pub schema_name: String,
    pub object_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Return type of a function
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChildEntry>,
}

impl CatalogEntry {
    pub fn new(
        kind: ObjectKind,
        schema_name: impl Into<String>,
        object_name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            schema_name: schema_name.into(),
            object_name: object_name.into(),
            comment: None,
            return_type: None,
            children: Vec::new(),
        }
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment.filter(|c| !c.is_empty());
        self
    }

    pub fn with_return_type(mut self, return_type: Option<String>) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn with_children(mut self, children: Vec<ChildEntry>) -> Self {
        self.children = children;
        self
    }

    /// `schema.object`, or just the schema name for schema entries.
    pub fn qualified_name(&self) -> String {
        if self.kind == ObjectKind::Schema {
            self.object_name.clone()
        } else {
            format!("{}.{}", self.schema_name, self.object_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_kind_from_str_accepts_plural() {
        assert_eq!("tables".parse::<ObjectKind>().unwrap(), ObjectKind::Table);
        assert_eq!("View".parse::<ObjectKind>().unwrap(), ObjectKind::View);
        assert!("index".parse::<ObjectKind>().is_err());
    }

    #[test]
    fn test_qualified_name_parse() {
        let q = QualifiedName::parse("sales.orders").unwrap();
        assert_eq!(q.schema.as_deref(), Some("sales"));
        assert_eq!(q.name, "orders");

        let q = QualifiedName::parse("ORDERS").unwrap();
        assert_eq!(q.schema, None);

        let q = QualifiedName::parse(r#""My Schema"."Order.Lines""#).unwrap();
        assert_eq!(q.schema.as_deref(), Some("My Schema"));
        assert_eq!(q.name, "Order.Lines");

        let q = QualifiedName::parse(r#""a""b""#).unwrap();
        assert_eq!(q.name, "a\"b");
    }

    #[test]
    fn test_qualified_name_parse_errors() {
        assert!(QualifiedName::parse("a.b.c").is_err());
        assert!(QualifiedName::parse("a.").is_err());
        assert!(QualifiedName::parse("\"open").is_err());
        assert!(QualifiedName::parse("").is_err());
    }

    #[test]
    fn test_entry_qualified_name() {
        let table = CatalogEntry::new(ObjectKind::Table, "SALES", "ORDERS");
        assert_eq!(table.qualified_name(), "SALES.ORDERS");
        let schema = CatalogEntry::new(ObjectKind::Schema, "SALES", "SALES");
        assert_eq!(schema.qualified_name(), "SALES");
    }

    #[test]
    fn test_empty_comment_dropped() {
        let e = CatalogEntry::new(ObjectKind::Table, "s", "t").with_comment(Some(String::new()));
        assert_eq!(e.comment, None);
    }

    #[test]
    fn test_resolution_serialization() {
        let fk = ForeignKeyRef {
            constraint: None,
            schema: "s".into(),
            table: "t".into(),
            column: Some("id".into()),
            resolution: Resolution::NameOnly,
        };
        let json = serde_json::to_value(&fk).unwrap();
        assert_eq!(json["resolution"]["status"], "name_only");
        assert!(json.get("constraint").is_none());
    }
}
