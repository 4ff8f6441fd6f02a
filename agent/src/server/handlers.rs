//! HTTP request handlers

use std::sync::Arc;

use agent_api::{ApiResponse, ApplyOutcome, DeployRequest, RollbackRequest};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use crate::errors::AgentError;
use crate::models::deployment::{parse_deploy_request, DeploymentTarget};
use crate::server::state::ServerState;
use crate::utils::version_info;

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = match &self {
            AgentError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AgentError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = ApiResponse::error(self.to_string());
        body.state = self.apply_outcome();
        (status, Json(body)).into_response()
    }
}

/// Liveness probe, no authorization
pub async fn health_handler() -> Json<ApiResponse> {
    Json(ApiResponse {
        version: Some(version_info().version),
        ..ApiResponse::ok()
    })
}

/// Deploy a new generation to one slot
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<DeployRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, AgentError> {
    let Json(req) = payload.map_err(|e| AgentError::ValidationError(e.body_text()))?;
    let (target, bundle) = parse_deploy_request(req)?;

    let _guard = state.locks.lock(&target).await;
    info!(app = target.app(), tag = target.tag(), "Deploy requested");

    state.engine.apply_new(&target, &bundle).await?;
    Ok(Json(ApiResponse::ok().with_state(ApplyOutcome::Succeeded)))
}

/// Restore the backup generation of one slot
pub async fn rollback_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<RollbackRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, AgentError> {
    let Json(req) = payload.map_err(|e| AgentError::ValidationError(e.body_text()))?;
    let target = DeploymentTarget::try_from(req)?;

    let _guard = state.locks.lock(&target).await;
    info!(app = target.app(), tag = target.tag(), "Rollback requested");

    state.engine.restore_previous(&target).await?;
    Ok(Json(ApiResponse::ok().with_state(ApplyOutcome::Succeeded)))
}

/// Unknown paths
pub async fn not_found_handler(uri: Uri) -> AgentError {
    AgentError::NotFound(format!("No route for {}", uri.path()))
}
