//! Bearer-token authentication for the HTTP transport.
//!
//! With no tokens configured every request is let through. Otherwise each
//! request must carry `Authorization: Bearer <token>` matching one of them.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    tokens: Vec<String>,
}

impl AuthConfig {
    /// Tokens are trimmed; a blank token is a configuration error.
    pub fn from_tokens(tokens: &[String]) -> Result<Self, String> {
        let mut accepted: Vec<String> = Vec::with_capacity(tokens.len());
        for token in tokens {
            let token = token.trim();
            if token.is_empty() {
                return Err("Empty value in --auth-token".to_string());
            }
            if !accepted.iter().any(|t| t == token) {
                accepted.push(token.to_string());
            }
        }
        Ok(Self { tokens: accepted })
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        !self.tokens.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Compare against every token without stopping early.
    fn accepts(&self, provided: &str) -> bool {
        self.tokens.iter().fold(false, |found, expected| {
            let same = expected.len() == provided.len()
                && bool::from(expected.as_bytes().ct_eq(provided.as_bytes()));
            found | same
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
enum BearerError {
    Missing,
    Malformed(&'static str),
}

fn bearer_token(request: &Request<Body>) -> Result<&str, BearerError> {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(BearerError::Missing)?
        .to_str()
        .map_err(|_| BearerError::Malformed("Authorization header is not valid text"))?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(BearerError::Malformed("Expected 'Authorization: Bearer <token>'"))?;
    if token.is_empty() {
        return Err(BearerError::Malformed("Bearer token is empty"));
    }
    Ok(token)
}

/// Reject requests without a configured bearer token.
pub async fn require_bearer(
    State(auth): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !auth.is_enabled() {
        return next.run(request).await;
    }
    match bearer_token(&request) {
        Ok(token) if auth.accepts(token) => next.run(request).await,
        Ok(_) => {
            warn!(path = %request.uri().path(), "Rejected request with unknown token");
            unauthorized("Invalid bearer token")
        }
        Err(BearerError::Missing) => {
            warn!(path = %request.uri().path(), "Rejected request without Authorization header");
            unauthorized("Missing bearer token")
        }
        Err(BearerError::Malformed(reason)) => {
            warn!(path = %request.uri().path(), "Rejected malformed Authorization header");
            unauthorized(reason)
        }
    }
}

#[derive(Serialize)]
struct Unauthorized {
    error: &'static str,
    message: String,
}

fn unauthorized(message: impl Into<String>) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        axum::Json(Unauthorized {
            error: "unauthorized",
            message: message.into(),
        }),
    )
        .into_response()
}
