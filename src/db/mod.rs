//! Database access layer.
//!
//! - Session and connector seams ([`DbSession`], [`Connector`])
//! - sqlx-backed sessions for PostgreSQL, MySQL and SQLite
//! - Trust-mode aware session creation
//! - Identity-keyed session pool

pub mod driver;
pub mod factory;
pub mod pool;
pub mod session;

pub use driver::{SqlxConnector, SqlxSession};
pub use factory::ConnectionFactory;
pub use pool::{PoolStats, ScopedSession, SessionPool};
pub use session::{CatalogRow, Connector, DbSession};
