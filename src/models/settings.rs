//! Catalog settings document.
//!
//! Accepted either as inline JSON or as a path to a JSON file:
//!
//! ```json
//! {
//!   "schemas":   { "like_pattern": "SALES%" },
//!   "tables":    { "regexp_pattern": "(CUST|ORD).*" },
//!   "views":     { "enable": true },
//!   "functions": { "enable": false },
//!   "case_sensitive": false,
//!   "language": "english"
//! }
//! ```
//!
//! A `regexp_pattern` must match the whole object name.

use crate::catalog::builder::whole_name;
use crate::error::{DbError, DbResult};
use crate::models::ObjectKind;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Visibility and name filters for one object kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ObjectFilter {
    pub enable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub like_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regexp_pattern: Option<String>,
}

impl Default for ObjectFilter {
    fn default() -> Self {
        Self::enabled()
    }
}

impl ObjectFilter {
    pub fn enabled() -> Self {
        Self {
            enable: true,
            like_pattern: None,
            regexp_pattern: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enable: false,
            ..Self::enabled()
        }
    }

    pub fn with_like(mut self, pattern: impl Into<String>) -> Self {
        self.like_pattern = Some(pattern.into());
        self
    }

    pub fn with_regexp(mut self, pattern: impl Into<String>) -> Self {
        self.regexp_pattern = Some(pattern.into());
        self
    }
}

fn views_default() -> ObjectFilter {
    ObjectFilter::disabled()
}

/// Text normalization language for the keyword index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    /// Tokenize and fold only.
    #[default]
    None,
    English,
}

impl Language {
    pub fn parse(value: &str) -> DbResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" => Ok(Self::None),
            "english" | "en" => Ok(Self::English),
            other => Err(DbError::config(format!(
                "Unsupported search language '{}'. Supported: english",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogSettings {
    #[serde(alias = "schema")]
    pub schemas: ObjectFilter,
    #[serde(alias = "table")]
    pub tables: ObjectFilter,
    #[serde(alias = "view", default = "views_default")]
    pub views: ObjectFilter,
    #[serde(alias = "function")]
    pub functions: ObjectFilter,
    #[serde(alias = "script")]
    pub scripts: ObjectFilter,
    pub case_sensitive: bool,
    pub language: String,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            schemas: ObjectFilter::enabled(),
            tables: ObjectFilter::enabled(),
            views: views_default(),
            functions: ObjectFilter::enabled(),
            scripts: ObjectFilter::enabled(),
            case_sensitive: false,
            language: String::new(),
        }
    }
}

impl CatalogSettings {
    /// Load from inline JSON or from a JSON file path.
    pub fn load(source: &str) -> DbResult<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        if trimmed.starts_with('{') {
            return Self::from_json(trimmed);
        }
        let path = Path::new(trimmed);
        let text = std::fs::read_to_string(path).map_err(|e| {
            DbError::config(format!(
                "Cannot read catalog settings file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> DbResult<Self> {
        let settings: Self = serde_json::from_str(text)
            .map_err(|e| DbError::config(format!("Invalid catalog settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> DbResult<()> {
        self.language()?;
        for kind in ObjectKind::ALL {
            if let Some(pattern) = &self.filter(kind).regexp_pattern {
                regex::Regex::new(&whole_name(pattern)).map_err(|e| {
                    DbError::config(format!("Invalid {} regexp_pattern: {}", kind, e))
                })?;
            }
        }
        Ok(())
    }

    pub fn language(&self) -> DbResult<Language> {
        Language::parse(&self.language)
    }

    pub fn filter(&self, kind: ObjectKind) -> &ObjectFilter {
        match kind {
            ObjectKind::Schema => &self.schemas,
            ObjectKind::Table => &self.tables,
            ObjectKind::View => &self.views,
            ObjectKind::Function => &self.functions,
            ObjectKind::Script => &self.scripts,
        }
    }

    pub fn filter_mut(&mut self, kind: ObjectKind) -> &mut ObjectFilter {
        match kind {
            ObjectKind::Schema => &mut self.schemas,
            ObjectKind::Table => &mut self.tables,
            ObjectKind::View => &mut self.views,
            ObjectKind::Function => &mut self.functions,
            ObjectKind::Script => &mut self.scripts,
        }
    }

    pub fn is_enabled(&self, kind: ObjectKind) -> bool {
        self.filter(kind).enable
    }
}
