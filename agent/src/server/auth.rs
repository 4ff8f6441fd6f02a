//! Bearer token authentication

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use http::header::AUTHORIZATION;
use tracing::warn;

use crate::errors::AgentError;
use crate::server::state::ServerState;

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Reject requests that do not carry the shared secret
pub async fn require_bearer(
    State(state): State<Arc<ServerState>>,
    req: Request,
    next: Next,
) -> Result<Response, AgentError> {
    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);

    let rejection = match presented {
        Some(token) if state.token_matches(token) => None,
        Some(_) => Some("Invalid bearer token"),
        None => Some("Missing bearer token"),
    };

    match rejection {
        None => Ok(next.run(req).await),
        Some(reason) => {
            warn!(path = %req.uri().path(), "Rejected request: {}", reason);
            Err(AgentError::Unauthorized(reason.to_string()))
        }
    }
}
