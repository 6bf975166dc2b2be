//! MCP tool implementations.
//!
//! - `list_objects`: List schemas, tables, views, functions or scripts
//! - `describe_object`: Columns, parameters and foreign keys of one object
//! - `find_objects`: Keyword search over the catalog
//! - `refresh_index`: Rebuild the caller's search index
//! - `health_check`: Probe the caller's database session

pub mod catalog;
pub mod health;
pub mod search;

pub use catalog::{
    CatalogToolHandler, DescribeObjectInput, DescribeObjectOutput, ListObjectsInput,
    ListObjectsOutput,
};
pub use health::{HealthCheckOutput, HealthToolHandler};
pub use search::{FindObjectsInput, FindObjectsOutput, RefreshIndexOutput, SearchToolHandler};
