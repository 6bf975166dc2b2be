//! Request authentication for the HTTP transport.
//!
//! Two concerns live here:
//! - an optional static bearer-token gate for shared deployments
//! - turning the caller's bearer token into an [`AuthContext`]
//!
//! Bearer tokens carrying identities are validated upstream (gateway or
//! identity provider); this module only reads their claims.

use crate::identity::AuthContext;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Static bearer tokens accepted by the HTTP transport.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    enabled: bool,
    tokens: HashSet<String>,
}

impl AuthConfig {
    /// Create a new AuthConfig from a list of tokens.
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self, String> {
        let mut valid_tokens = HashSet::new();
        for token in tokens {
            let trimmed = token.trim().to_string();
            if trimmed.is_empty() {
                return Err("Empty token value in configuration".to_string());
            }
            valid_tokens.insert(trimmed);
        }
        let enabled = !valid_tokens.is_empty();
        Ok(Self {
            enabled,
            tokens: valid_tokens,
        })
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            tokens: HashSet::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    fn accepts(&self, provided: &str) -> bool {
        // Compare against every token so timing does not reveal which matched
        self.tokens.iter().fold(false, |found, expected| {
            found | constant_time_eq(provided.as_bytes(), expected.as_bytes())
        })
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Rejects requests whose bearer token is not one of the configured tokens.
pub async fn auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let token = match bearer_token(request.headers()) {
        Ok(Some(token)) => token,
        Ok(None) => {
            warn!("Authentication failed: missing Authorization header");
            return unauthorized_response(
                "Missing Bearer token in Authorization header",
                "Include a valid token: 'Authorization: Bearer <token>'",
            );
        }
        Err(msg) => {
            warn!("Authentication failed: invalid header format");
            return unauthorized_response(
                msg,
                "Use the format: 'Authorization: Bearer <your-token>'",
            );
        }
    };

    if auth_config.accepts(token) {
        next.run(request).await
    } else {
        warn!(token_prefix = %mask_token(token), "Authentication failed: invalid token");
        unauthorized_response(
            "Invalid Bearer token",
            "Check that you are using a valid token configured on the server",
        )
    }
}

/// The bearer token from the Authorization header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, &'static str> {
    let Some(auth_header) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Authorization header contains invalid characters")?;

    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return Err("Invalid Authorization header format. Expected 'Bearer <token>'");
    };

    let token = token.trim();
    if token.is_empty() {
        return Err("Bearer token is empty");
    }

    Ok(Some(token))
}

/// Read the claims of a JWT without verifying it.
///
/// Only string, number and boolean claims are kept. Returns `None` for
/// anything that is not a three-part token with a JSON object payload.
pub fn decode_jwt_claims(token: &str) -> Option<BTreeMap<String, String>> {
    let mut parts = token.split('.');
    let (_, payload, _) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let object = value.as_object()?;

    Some(
        object
            .iter()
            .filter_map(|(name, value)| {
                let text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((name.clone(), text))
            })
            .collect(),
    )
}

/// Build the caller's authentication context from request headers.
///
/// Returns `None` when the request carries no bearer token. An opaque
/// (non-JWT) token yields a context with no claims.
pub fn auth_context_from_headers(headers: &HeaderMap) -> Option<AuthContext> {
    let token = bearer_token(headers).ok().flatten()?;
    let claims = decode_jwt_claims(token).unwrap_or_else(|| {
        debug!(token_prefix = %mask_token(token), "Bearer token is not a JWT");
        BTreeMap::new()
    });
    Some(AuthContext::new(Some(token.to_string()), claims))
}

pub fn auth_context_from_parts(parts: &Parts) -> Option<AuthContext> {
    auth_context_from_headers(&parts.headers)
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

fn mask_token(token: &str) -> String {
    match token.get(..3) {
        Some(prefix) if token.len() > 3 => format!("{}***", prefix),
        _ => "***".to_string(),
    }
}

fn unauthorized_response(message: impl Into<String>, suggestion: impl Into<String>) -> Response {
    #[derive(Serialize)]
    struct ErrorResponse {
        error: ErrorDetail,
    }
    #[derive(Serialize)]
    struct ErrorDetail {
        code: &'static str,
        message: String,
        suggestion: String,
    }

    let body = ErrorResponse {
        error: ErrorDetail {
            code: "unauthorized",
            message: message.into(),
            suggestion: suggestion.into(),
        },
    };
    let json = serde_json::to_string(&body).unwrap_or_else(|_| {
        r#"{"error":{"code":"unauthorized","message":"Authentication failed"}}"#.to_string()
    });

    (
        StatusCode::UNAUTHORIZED,
        [(header::CONTENT_TYPE, "application/json")],
        json,
    )
        .into_response()
}
