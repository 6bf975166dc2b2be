//! Catalog MCP Server Library
//!
//! This library lets AI agents discover database objects (schemas, tables,
//! views, functions and procedures) through MCP tools, with every catalog
//! query running under the caller's own database identity.

pub mod auth;
pub mod broker;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod mcp;
pub mod models;
pub mod search;
pub mod tools;
pub mod transport;

pub use broker::CatalogBroker;
pub use config::Config;
pub use error::DbError;
pub use mcp::CatalogService;
