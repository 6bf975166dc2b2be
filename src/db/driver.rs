//! sqlx-backed sessions.
//!
//! Each pooled identity owns one dedicated connection, so this module opens
//! single connections rather than sqlx pools.

use crate::db::session::{CatalogRow, Connector, DbSession};
use crate::error::{DbError, DbResult};
use crate::models::{Credentials, DatabaseType};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Column, Connection, Row};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Render one column as text, trying the types catalog queries produce.
macro_rules! decode_value {
    ($row:expr, $idx:expr) => {{
        let row = $row;
        let idx = $idx;
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            v
        } else if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            v.map(|n| n.to_string())
        } else if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            v.map(|n| n.to_string())
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
            v.map(|b| b.to_string())
        } else if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            // MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
            v.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        } else {
            None
        }
    }};
}

macro_rules! decode_rows {
    ($rows:expr) => {
        $rows
            .iter()
            .map(|row| {
                let mut out = CatalogRow::new();
                for column in row.columns() {
                    out.insert(column.name(), decode_value!(row, column.ordinal()));
                }
                out
            })
            .collect::<Vec<_>>()
    };
}

macro_rules! bind_all {
    ($sql:expr, $params:expr) => {{
        let mut query = sqlx::query($sql);
        for param in $params {
            query = query.bind(param.as_str());
        }
        query
    }};
}

enum Conn {
    Postgres(PgConnection),
    MySql(MySqlConnection),
    SQLite(SqliteConnection),
}

pub struct SqlxSession {
    dialect: DatabaseType,
    conn: Option<Conn>,
    broken: bool,
}

impl SqlxSession {
    fn conn(&mut self) -> DbResult<&mut Conn> {
        self.conn.as_mut().ok_or_else(|| {
            DbError::connection(
                "Session is closed",
                "The session will be reopened on the next request",
            )
        })
    }

    fn track(&mut self, err: sqlx::Error) -> DbError {
        let err = DbError::from(err);
        if err.is_connection() {
            self.broken = true;
        }
        err
    }
}

#[async_trait]
impl DbSession for SqlxSession {
    fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    async fn fetch(&mut self, sql: &str, params: &[String]) -> DbResult<Vec<CatalogRow>> {
        debug!(sql = %sql, params = params.len(), "Fetching catalog rows");
        let result = match self.conn()? {
            Conn::Postgres(c) => bind_all!(sql, params)
                .fetch_all(&mut *c)
                .await
                .map(|rows| decode_rows!(rows)),
            Conn::MySql(c) => bind_all!(sql, params)
                .fetch_all(&mut *c)
                .await
                .map(|rows| decode_rows!(rows)),
            Conn::SQLite(c) => bind_all!(sql, params)
                .fetch_all(&mut *c)
                .await
                .map(|rows| decode_rows!(rows)),
        };
        result.map_err(|e| self.track(e))
    }

    async fn execute(&mut self, sql: &str) -> DbResult<()> {
        let result = match self.conn()? {
            Conn::Postgres(c) => sqlx::query(sql).execute(&mut *c).await.map(|_| ()),
            Conn::MySql(c) => sqlx::query(sql).execute(&mut *c).await.map(|_| ()),
            Conn::SQLite(c) => sqlx::query(sql).execute(&mut *c).await.map(|_| ()),
        };
        result.map_err(|e| self.track(e))
    }

    async fn current_user(&mut self) -> DbResult<String> {
        let sql = match self.dialect {
            DatabaseType::PostgreSQL => "SELECT current_user::text AS user_name",
            DatabaseType::MySQL => "SELECT SUBSTRING_INDEX(CURRENT_USER(), '@', 1) AS user_name",
            // SQLite has no users
            DatabaseType::SQLite => return Ok(String::new()),
        };
        let rows = self.fetch(sql, &[]).await?;
        Ok(rows
            .first()
            .map(|row| row.text("user_name"))
            .unwrap_or_default())
    }

    async fn ping(&mut self) -> DbResult<()> {
        let result = match self.conn()? {
            Conn::Postgres(c) => c.ping().await,
            Conn::MySql(c) => c.ping().await,
            Conn::SQLite(c) => c.ping().await,
        };
        result.map_err(|e| self.track(e))
    }

    fn is_broken(&self) -> bool {
        self.broken
    }

    async fn close(&mut self) {
        let result = match self.conn.take() {
            Some(Conn::Postgres(c)) => c.close().await,
            Some(Conn::MySql(c)) => c.close().await,
            Some(Conn::SQLite(c)) => c.close().await,
            None => return,
        };
        if let Err(e) = result {
            debug!(error = %e, "Error while closing session");
        }
    }
}

/// Opens sessions against the configured database URL.
#[derive(Debug, Clone)]
pub struct SqlxConnector {
    /// Contains sensitive data - never log
    url: String,
    dialect: DatabaseType,
    connect_timeout: Duration,
}

impl SqlxConnector {
    pub fn new(url: impl Into<String>, dialect: DatabaseType) -> Self {
        Self {
            url: url.into(),
            dialect,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn connect(&self, credentials: &Credentials) -> Result<Conn, sqlx::Error> {
        match self.dialect {
            DatabaseType::PostgreSQL => {
                let mut options =
                    PgConnectOptions::from_str(&self.url)?.application_name("catalog-mcp-server");
                if let Credentials::Login { username, secret } = credentials {
                    options = options.username(username).password(secret.expose());
                }
                Ok(Conn::Postgres(PgConnection::connect_with(&options).await?))
            }
            DatabaseType::MySQL => {
                let mut options = MySqlConnectOptions::from_str(&self.url)?.charset("utf8mb4");
                if let Credentials::Login { username, secret } = credentials {
                    options = options.username(username).password(secret.expose());
                }
                Ok(Conn::MySql(MySqlConnection::connect_with(&options).await?))
            }
            DatabaseType::SQLite => {
                // Catalog access never writes
                let options = SqliteConnectOptions::from_str(&self.url)?.read_only(true);
                Ok(Conn::SQLite(SqliteConnection::connect_with(&options).await?))
            }
        }
    }

    fn connection_suggestion(&self, error: &sqlx::Error) -> String {
        let error_str = error.to_string().to_lowercase();

        if error_str.contains("connection refused") {
            return format!(
                "Check that the {} server is running and accessible",
                self.dialect
            );
        }
        if error_str.contains("tls") || error_str.contains("ssl") {
            return "Check TLS/SSL configuration or try disabling it".to_string();
        }
        match self.dialect {
            DatabaseType::PostgreSQL => {
                "Verify the connection string format: postgres://host:5432/db".to_string()
            }
            DatabaseType::MySQL => {
                "Verify the connection string format: mysql://host:3306/db".to_string()
            }
            DatabaseType::SQLite => {
                "Verify the file path exists and is accessible: sqlite:path/to/db.sqlite"
                    .to_string()
            }
        }
    }
}

#[async_trait]
impl Connector for SqlxConnector {
    fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    async fn open(&self, credentials: &Credentials) -> DbResult<Box<dyn DbSession>> {
        let conn = match tokio::time::timeout(self.connect_timeout, self.connect(credentials)).await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                let suggestion = self.connection_suggestion(&e);
                return Err(match DbError::from(e) {
                    DbError::Connection { message, .. } => {
                        DbError::connection(message, suggestion)
                    }
                    other => other,
                });
            }
            Err(_) => {
                return Err(DbError::connection(
                    format!(
                        "Timed out after {}s connecting to {}",
                        self.connect_timeout.as_secs(),
                        self.dialect
                    ),
                    "Check network connectivity and database server status",
                ));
            }
        };
        debug!(dialect = %self.dialect, user = ?credentials.username(), "Opened session");
        Ok(Box::new(SqlxSession {
            dialect: self.dialect,
            conn: Some(conn),
            broken: false,
        }))
    }
}
