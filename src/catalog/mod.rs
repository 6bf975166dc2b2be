//! Catalog discovery.
//!
//! - Per-dialect catalog SQL
//! - Parameterized query construction with LIKE/regexp filtering
//! - Listing and describing objects through a pooled session

pub mod builder;
pub mod metadata;
pub mod queries;

pub use builder::{CatalogQuery, QueryBuilder, SelectQuery, SkipReason};
pub use metadata::{MetadataCatalog, ObjectListing};
