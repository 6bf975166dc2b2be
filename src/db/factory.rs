//! Session creation under the configured trust mode.

use crate::db::session::{Connector, DbSession};
use crate::error::{DbError, DbResult};
use crate::identity::{Identity, IdentityKey};
use crate::models::{Credentials, DatabaseType, Secret, TrustMode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_CONNECT_RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Quote an identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// The statement that switches a session to `user`, if the dialect has one.
pub fn impersonation_statement(dialect: DatabaseType, user: &str) -> Option<String> {
    match dialect {
        DatabaseType::PostgreSQL => Some(format!("SET ROLE {}", quote_identifier(user))),
        DatabaseType::MySQL | DatabaseType::SQLite => None,
    }
}

pub struct ConnectionFactory {
    connector: Arc<dyn Connector>,
    trust_mode: TrustMode,
    retry_backoff: Duration,
}

impl std::fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("dialect", &self.connector.dialect())
            .field("trust_mode", &self.trust_mode.kind())
            .finish_non_exhaustive()
    }
}

impl ConnectionFactory {
    pub fn new(connector: Arc<dyn Connector>, trust_mode: TrustMode) -> Self {
        Self {
            connector,
            trust_mode,
            retry_backoff: DEFAULT_CONNECT_RETRY_BACKOFF,
        }
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn trust_mode(&self) -> &TrustMode {
        &self.trust_mode
    }

    pub fn dialect(&self) -> DatabaseType {
        self.connector.dialect()
    }

    /// The pool key a request with this identity maps to.
    pub fn key_for(&self, identity: Option<&Identity>) -> DbResult<IdentityKey> {
        if !self.trust_mode.is_per_user() {
            return Ok(IdentityKey::Shared);
        }
        identity
            .map(|i| IdentityKey::User(i.subject.clone()))
            .ok_or_else(|| {
                DbError::auth(format!(
                    "the {} trust mode requires an authenticated caller",
                    self.trust_mode.kind()
                ))
            })
    }

    /// The caller token a session is bound to. Only passthrough sessions log
    /// in with it; every other mode returns `None`.
    pub fn login_token<'a>(&self, identity: Option<&'a Identity>) -> Option<&'a str> {
        match self.trust_mode {
            TrustMode::Passthrough { .. } => identity.and_then(|i| i.token.as_deref()),
            _ => None,
        }
    }

    /// Open a fresh session for the caller.
    pub async fn acquire(&self, identity: Option<&Identity>) -> DbResult<Box<dyn DbSession>> {
        match &self.trust_mode {
            TrustMode::Local { credentials } | TrustMode::Delegated { credentials } => {
                self.open_with_retry(credentials).await
            }
            TrustMode::Passthrough { .. } => {
                let identity = identity.ok_or_else(|| {
                    DbError::auth("the passthrough trust mode requires an authenticated caller")
                })?;
                let token = identity.token.as_deref().ok_or_else(|| {
                    DbError::auth(format!(
                        "no access token available to log in as '{}'",
                        identity.subject
                    ))
                })?;
                let credentials = Credentials::login(
                    identity.subject.clone(),
                    Secret::AccessToken(token.to_string()),
                );
                let mut session = self.open_with_retry(&credentials).await?;
                self.verify_user(session.as_mut(), &identity.subject)
                    .await?;
                Ok(session)
            }
            TrustMode::Impersonation { credentials, .. } => {
                let identity = identity.ok_or_else(|| {
                    DbError::auth("the impersonation trust mode requires an authenticated caller")
                })?;
                let mut session = self.open_with_retry(credentials).await?;
                match self.impersonate(session.as_mut(), &identity.subject).await {
                    Ok(()) => Ok(session),
                    Err(e) => {
                        session.close().await;
                        Err(e)
                    }
                }
            }
        }
    }

    async fn open_with_retry(&self, credentials: &Credentials) -> DbResult<Box<dyn DbSession>> {
        match self.connector.open(credentials).await {
            Err(e) if e.is_connection() => {
                warn!(
                    error = %e,
                    backoff_ms = self.retry_backoff.as_millis() as u64,
                    "Connect failed, retrying once"
                );
                tokio::time::sleep(self.retry_backoff).await;
                self.connector.open(credentials).await
            }
            other => other,
        }
    }

    /// Confirm the database resolved the session to the expected user.
    async fn verify_user(&self, session: &mut dyn DbSession, expected: &str) -> DbResult<()> {
        let actual = match session.current_user().await {
            Ok(user) => user,
            Err(e) => {
                session.close().await;
                return Err(e);
            }
        };
        if actual.eq_ignore_ascii_case(expected) {
            debug!(user = %actual, "Passthrough session verified");
            return Ok(());
        }
        session.close().await;
        warn!(expected = %expected, actual = %actual, "Passthrough user mismatch");
        Err(DbError::auth(format!(
            "the database resolved the session to '{}' instead of '{}'",
            actual, expected
        )))
    }

    async fn impersonate(&self, session: &mut dyn DbSession, user: &str) -> DbResult<()> {
        let statement = impersonation_statement(session.dialect(), user).ok_or_else(|| {
            DbError::config(format!(
                "{} does not support impersonation",
                session.dialect()
            ))
        })?;
        session.execute(&statement).await.map_err(|e| match e {
            DbError::Query { message, .. } | DbError::Auth { message } => {
                DbError::auth(format!("impersonation of '{}' was denied: {}", user, message))
            }
            other => other,
        })?;
        info!(user = %user, "Session impersonating caller");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("alice"), "\"alice\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_impersonation_statement() {
        assert_eq!(
            impersonation_statement(DatabaseType::PostgreSQL, "alice").as_deref(),
            Some("SET ROLE \"alice\"")
        );
        assert!(impersonation_statement(DatabaseType::MySQL, "alice").is_none());
    }
}
