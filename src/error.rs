//! Error types for the catalog MCP server.
//!
//! Every fallible operation returns [`DbResult`]. Variants are grouped by what
//! the caller can do about them: configuration and identity problems are
//! fatal for the request, connection and pool problems are retryable, query
//! problems carry the database's SQLSTATE when one is available.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Identity error: {message}")]
    Identity { message: String },

    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Connection pool exhausted: {message}")]
    PoolExhausted { message: String },

    #[error("Query failed: {message}")]
    Query {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Object kind '{kind}' is disabled by the catalog settings")]
    KindDisabled { kind: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an identity resolution error.
    pub fn identity(message: impl Into<String>) -> Self {
        Self::Identity {
            message: message.into(),
        }
    }

    /// Create an authentication/authorization error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn pool_exhausted(message: impl Into<String>) -> Self {
        Self::PoolExhausted {
            message: message.into(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn kind_disabled(kind: impl Into<String>) -> Self {
        Self::KindDisabled { kind: kind.into() }
    }

    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Query { suggestion, .. } => Some(suggestion),
            Self::PoolExhausted { .. } => {
                Some("Retry later or increase the pool size / acquire timeout")
            }
            Self::Identity { .. } => {
                Some("Send a bearer token carrying the configured username claim")
            }
            Self::KindDisabled { .. } => Some("Enable the object kind in the catalog settings"),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::PoolExhausted { .. })
    }

    /// True for transport-level failures that a fresh session may fix.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// SQLSTATE / vendor codes that mean the credentials were rejected.
const AUTH_ERROR_CODES: &[&str] = &[
    "28000", // invalid_authorization_specification
    "28P01", // invalid_password
    "42501", // insufficient_privilege
    "1044",  // ER_DBACCESS_DENIED_ERROR
    "1045",  // ER_ACCESS_DENIED_ERROR
    "1698",  // ER_ACCESS_DENIED_NO_PASSWORD_ERROR
];

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::config(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                if code
                    .as_deref()
                    .is_some_and(|c| AUTH_ERROR_CODES.contains(&c))
                {
                    return DbError::auth(db_err.message().to_string());
                }
                DbError::query(
                    db_err.message(),
                    code,
                    "Check that the catalog views are readable by this user",
                )
            }
            sqlx::Error::RowNotFound => DbError::query(
                "No rows returned",
                None,
                "Verify the object name and kind",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out waiting for a database connection",
                "Check network connectivity and database server status",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::WorkerCrashed => DbError::connection(
                "Database worker crashed",
                "The session will be reopened on the next request",
            ),
            sqlx::Error::ColumnNotFound(col) => DbError::query(
                format!("Column not found: {}", col),
                None,
                "Check the catalog query for this dialect",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build suggestion data as JSON value.
fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
/// Includes the suggestion field in the `data` object when available.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = suggestion_data(err.suggestion());
        match &err {
            DbError::InvalidInput { .. }
            | DbError::KindDisabled { .. }
            | DbError::Identity { .. }
            | DbError::Auth { .. } => rmcp::ErrorData::invalid_params(err.to_string(), data),

            DbError::NotFound { .. } => rmcp::ErrorData::resource_not_found(err.to_string(), data),

            // Query errors keep the SQLSTATE in the message
            DbError::Query {
                message, sql_state, ..
            } => {
                let msg = match sql_state {
                    Some(code) => format!("{} (SQLSTATE: {})", message, code),
                    None => message.clone(),
                };
                rmcp::ErrorData::invalid_params(msg, data)
            }

            DbError::Config { .. }
            | DbError::Connection { .. }
            | DbError::PoolExhausted { .. }
            | DbError::Internal { .. } => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));

        let err = DbError::not_found("table", "SALES.ORDERS");
        assert_eq!(err.to_string(), "table not found: SALES.ORDERS");
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::query("Syntax error", Some("42601".to_string()), "Check SQL syntax");
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert!(DbError::auth("denied").suggestion().is_none());
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::pool_exhausted("full").is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::auth("bad password").is_retryable());
        assert!(!DbError::pool_exhausted("full").is_connection());
    }

    #[test]
    fn test_io_error_is_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: DbError = sqlx::Error::Io(io).into();
        assert!(err.is_connection());
    }

    #[test]
    fn test_invalid_input_maps_to_invalid_params() {
        let mcp_err: rmcp::ErrorData = DbError::invalid_input("bad input").into();
        // invalid_params uses -32602
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_identity_and_auth_map_to_invalid_params() {
        let mcp_err: rmcp::ErrorData = DbError::identity("claim missing").into();
        assert_eq!(mcp_err.code.0, -32602);
        let mcp_err: rmcp::ErrorData = DbError::auth("user mismatch").into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_not_found_maps_to_resource_not_found() {
        let mcp_err: rmcp::ErrorData = DbError::not_found("view", "V1").into();
        // resource_not_found uses -32002 in rmcp
        assert_eq!(mcp_err.code.0, -32002);
    }

    #[test]
    fn test_connection_maps_to_internal_error() {
        let mcp_err: rmcp::ErrorData = DbError::connection("failed", "try again").into();
        // internal_error uses -32603
        assert_eq!(mcp_err.code.0, -32603);
        let mcp_err: rmcp::ErrorData = DbError::pool_exhausted("busy").into();
        assert_eq!(mcp_err.code.0, -32603);
    }

    #[test]
    fn test_query_error_includes_sql_state() {
        let err = DbError::query("syntax error", Some("42601".to_string()), "check syntax");
        let mcp_err: rmcp::ErrorData = err.into();
        assert!(mcp_err.message.contains("42601"));
        assert_eq!(mcp_err.data.unwrap()["suggestion"], "check syntax");
    }

    #[test]
    fn test_kind_disabled_includes_suggestion_in_data() {
        let mcp_err: rmcp::ErrorData = DbError::kind_disabled("view").into();
        assert_eq!(mcp_err.code.0, -32602);
        let data = mcp_err.data.unwrap();
        assert!(data["suggestion"].as_str().unwrap().contains("catalog settings"));
    }
}
