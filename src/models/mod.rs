//! Data models for the catalog MCP server.
//!
//! This module re-exports all model types used throughout the application.

pub mod catalog;
pub mod connection;
pub mod settings;

// Re-export commonly used types
pub use catalog::{
    CatalogEntry, ChildEntry, ForeignKeyRef, ObjectKind, QualifiedName, Resolution,
};
pub use connection::{
    ConnectionConfig, Credentials, DEFAULT_POOL_SIZE, DatabaseType, Secret, TrustMode,
    TrustModeKind, TrustSettings,
};
pub use settings::{CatalogSettings, Language, ObjectFilter};
