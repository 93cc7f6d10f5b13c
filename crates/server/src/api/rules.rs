//! # Rules API
//!
//! Conflict detection between proposed RCC rows and the rules already in the
//! configuration repository.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use onboard_core::rules::{self, ConflictReport, ConflictScan, RejectedRow, UnclassifiedRow};
use onboard_core::Artifact;

use super::ApiError;
use crate::SharedState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConflictRequest {
    /// Proposed rows, one per line
    pub rows: String,
    /// Existing rules document (YAML). Read from `branch` when absent.
    pub existing_rules: Option<String>,
    pub branch: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConflictResponse {
    pub has_conflicts: bool,
    #[schema(value_type = Vec<Object>)]
    pub conflicts: Vec<ConflictReport>,
    /// Lines that could not be parsed
    #[schema(value_type = Vec<Object>)]
    pub rejected: Vec<RejectedRow>,
    /// Rows that match no single rule family
    #[schema(value_type = Vec<Object>)]
    pub unclassified: Vec<UnclassifiedRow>,
}

impl From<ConflictScan> for ConflictResponse {
    fn from(scan: ConflictScan) -> Self {
        Self {
            has_conflicts: scan.has_conflicts(),
            conflicts: scan.conflicts,
            rejected: scan.rejected,
            unclassified: scan.unclassified,
        }
    }
}

pub fn rule_routes() -> Router<SharedState> {
    Router::new().route("/conflicts", post(check_conflicts))
}

async fn existing_rules(state: &SharedState, req: &ConflictRequest) -> Result<String, ApiError> {
    if let Some(blob) = &req.existing_rules {
        return Ok(blob.clone());
    }

    let branch = req
        .branch
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ApiError::bad_request("Either existing_rules or branch is required"))?;
    let path = state.pipeline.settings().paths.path_for(Artifact::Rules);

    match state.pipeline.store().get_file_content(branch, path).await {
        Ok(Some(content)) => Ok(content),
        Ok(None) => Err(ApiError::not_found(format!("{} not found in {}", path, branch))),
        Err(err) => Err(ApiError::new(
            StatusCode::BAD_GATEWAY,
            format!("Failed to fetch {}: {}", path, err),
        )),
    }
}

/// Detect conflicting RCC rows
#[utoipa::path(
    post,
    path = "/api/v1/rules/conflicts",
    tag = "rules",
    request_body = ConflictRequest,
    responses(
        (status = 200, description = "Conflict report", body = ConflictResponse),
        (status = 400, description = "Invalid request or rules document", body = super::ApiResponse),
        (status = 404, description = "Rules document not found on branch", body = super::ApiResponse)
    )
)]
pub async fn check_conflicts(
    State(state): State<SharedState>,
    Json(req): Json<ConflictRequest>,
) -> Result<Json<ConflictResponse>, ApiError> {
    let blob = existing_rules(&state, &req).await?;
    let scan = rules::scan(&blob, &req.rows)
        .map_err(|err| ApiError::bad_request(format!("Invalid rules document: {}", err)))?;

    tracing::debug!(
        conflicts = scan.conflicts.len(),
        rejected = scan.rejected.len(),
        "Conflict check finished"
    );
    Ok(Json(scan.into()))
}
