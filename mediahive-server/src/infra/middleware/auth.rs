use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use constant_time_eq::constant_time_eq;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

use crate::errors::AppError;
use crate::infra::app_state::AppState;

/// Bearer tokens accepted on the private routes, kept only as digests.
#[derive(Default)]
pub struct ApiTokens {
    digests: Vec<[u8; 32]>,
}

impl fmt::Debug for ApiTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiTokens")
            .field("count", &self.digests.len())
            .finish()
    }
}

impl ApiTokens {
    pub fn new<S: AsRef<str>>(tokens: impl IntoIterator<Item = S>) -> Self {
        Self {
            digests: tokens
                .into_iter()
                .map(|token| digest(token.as_ref()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn verify(&self, presented: &str) -> bool {
        let presented = digest(presented);
        // No early exit.
        self.digests
            .iter()
            .fold(false, |found, known| constant_time_eq(known, &presented) | found)
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

fn extract_bearer_token(request: &Request) -> Option<&str> {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Rejects requests without a configured bearer token.
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let verified = extract_bearer_token(&request).map(|token| state.tokens.verify(token));
    match verified {
        Some(true) => next.run(request).await,
        Some(false) => {
            debug!(path = %request.uri().path(), "rejected unknown bearer token");
            AppError::unauthorized("Invalid bearer token").into_response()
        }
        None => AppError::unauthorized("Authentication required").into_response(),
    }
}
