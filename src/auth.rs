use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use crate::config::Auth;
use crate::handler::AppState;

/// Turns a bearer token into a subject. `None` means the request is anonymous.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, token: &str) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// HS256 JWT verification against a shared secret.
pub struct JwtIdentity {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentity {
    pub fn new(cfg: &Auth) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = cfg.issuer.as_deref().filter(|s| !s.is_empty()) {
            validation.set_issuer(&[issuer]);
        }
        match cfg.audience.as_deref().filter(|s| !s.is_empty()) {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        JwtIdentity {
            key: DecodingKey::from_secret(cfg.jwt_secret.as_bytes()),
            validation,
        }
    }
}

impl IdentityProvider for JwtIdentity {
    fn resolve(&self, token: &str) -> Option<String> {
        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) if !data.claims.sub.is_empty() => Some(data.claims.sub),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "rejected bearer token");
                None
            }
        }
    }
}

/// The resolved identity of the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller(Option<String>);

impl Caller {
    pub fn anonymous() -> Self {
        Caller(None)
    }

    pub fn subject(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl From<&str> for Caller {
    fn from(subject: &str) -> Self {
        Caller(Some(subject.to_string()))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

const STREAM_PATH: &str = "/bookmarks/stream";

// EventSource cannot set headers, so only the stream route also takes the
// token from the query string.
fn query_token(parts: &Parts) -> Option<String> {
    if !parts.uri.path().ends_with(STREAM_PATH) {
        return None;
    }
    let raw = parts
        .uri
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("access_token="))?;
    urlencoding::decode(raw).ok().map(|token| token.into_owned())
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .map(str::to_string)
            .or_else(|| query_token(parts));
        Ok(Caller(token.and_then(|t| state.identity.resolve(&t))))
    }
}
