//! Caller identity resolution.
//!
//! The transport hands over an [`AuthContext`] built from the request's bearer
//! token. When the deployment authenticates per user, the configured username
//! claim names the database user the request runs as.

use crate::error::{DbError, DbResult};
use std::collections::BTreeMap;
use std::fmt;

/// Token and claims of the current request.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub token: Option<String>,
    pub claims: BTreeMap<String, String>,
}

impl AuthContext {
    pub fn new(token: Option<String>, claims: BTreeMap<String, String>) -> Self {
        Self { token, claims }
    }

    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("token", &self.token.as_ref().map(|_| "****"))
            .field("claims", &self.claims)
            .finish()
    }
}

/// The resolved caller.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub claims: BTreeMap<String, String>,
    pub token: Option<String>,
}

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            claims: BTreeMap::new(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("subject", &self.subject)
            .field("token", &self.token.as_ref().map(|_| "****"))
            .finish()
    }
}

/// Pool and index partition key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityKey {
    Shared,
    User(String),
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => f.write_str("<shared>"),
            Self::User(name) => f.write_str(name),
        }
    }
}

pub struct IdentityResolver;

impl IdentityResolver {
    /// Resolve the caller. Returns `Ok(None)` when no claim is configured.
    pub fn resolve(
        auth: Option<&AuthContext>,
        username_claim: Option<&str>,
    ) -> DbResult<Option<Identity>> {
        let Some(claim) = username_claim else {
            return Ok(None);
        };
        let Some(auth) = auth else {
            return Err(DbError::identity(
                "the request carries no authentication context",
            ));
        };
        let Some(value) = auth.claims.get(claim) else {
            return Err(DbError::identity(format!(
                "the access token has no '{}' claim",
                claim
            )));
        };
        let subject = value.trim();
        if subject.is_empty() {
            return Err(DbError::identity(format!(
                "the '{}' claim of the access token is empty",
                claim
            )));
        }
        Ok(Some(Identity {
            subject: subject.to_string(),
            claims: auth.claims.clone(),
            token: auth.token.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_claim_configured_yields_none() {
        let ctx = AuthContext::default().with_claim("sub", "alice");
        assert_eq!(IdentityResolver::resolve(Some(&ctx), None).unwrap(), None);
        assert_eq!(IdentityResolver::resolve(None, None).unwrap(), None);
    }

    #[test]
    fn test_claim_resolves_subject() {
        let ctx = AuthContext::default()
            .with_claim("preferred_username", "alice")
            .with_token("tok");
        let identity = IdentityResolver::resolve(Some(&ctx), Some("preferred_username"))
            .unwrap()
            .unwrap();
        assert_eq!(identity.subject, "alice");
        assert_eq!(identity.token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_missing_context_is_error() {
        let err = IdentityResolver::resolve(None, Some("sub")).unwrap_err();
        assert!(matches!(err, DbError::Identity { .. }));
    }

    #[test]
    fn test_missing_or_empty_claim_is_error() {
        let ctx = AuthContext::default().with_claim("email", "a@b");
        assert!(matches!(
            IdentityResolver::resolve(Some(&ctx), Some("sub")),
            Err(DbError::Identity { .. })
        ));

        let ctx = AuthContext::default().with_claim("sub", "  ");
        assert!(matches!(
            IdentityResolver::resolve(Some(&ctx), Some("sub")),
            Err(DbError::Identity { .. })
        ));
    }

    #[test]
    fn test_debug_hides_token() {
        let identity = Identity::new("bob").with_token("secret-token");
        assert!(!format!("{:?}", identity).contains("secret-token"));
    }
}
