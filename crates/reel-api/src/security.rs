//! API key check and path containment for file routes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, Response};
use axum::middleware::Next;
use axum::response::IntoResponse;
use sha2::{Digest, Sha256};
use tracing::warn;

use reel_models::join_contained;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Header carrying the shared secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Compare keys through their digests so timing does not depend on where
/// the inputs first differ.
pub fn keys_match(provided: &str, expected: &str) -> bool {
    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Reject requests without the configured `x-api-key`.
pub async fn require_api_key(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response<Body> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !keys_match(provided, &state.config.api_key) {
        warn!(uri = %request.uri(), "Rejected request with invalid API key");
        return ApiError::unauthorized("Invalid API key").into_response();
    }

    next.run(request).await
}

/// Lexically resolve `requested` under `root`. Fails if `..` climbs above it
/// or if the path is absolute.
fn resolve_lexically(root: &Path, requested: &str) -> ApiResult<PathBuf> {
    join_contained(root, requested).ok_or_else(|| ApiError::forbidden("Access denied"))
}

/// Map a request path to a location under `root` (which must be canonical).
///
/// The nearest existing ancestor of the target is canonicalised and checked
/// again, so symlinks cannot lead outside the root.
pub async fn safe_path(root: &Path, requested: &str) -> ApiResult<PathBuf> {
    let full = resolve_lexically(root, requested)?;

    let mut probe = full.as_path();
    loop {
        match tokio::fs::canonicalize(probe).await {
            Ok(real) => {
                if !real.starts_with(root) {
                    warn!(requested = %requested, "Path escapes the file root through a link");
                    return Err(ApiError::forbidden("Access denied"));
                }
                break;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => match probe.parent() {
                Some(parent) => probe = parent,
                None => break,
            },
            Err(e) => return Err(e.into()),
        }
    }

    Ok(full)
}
