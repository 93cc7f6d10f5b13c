//! # Onboarding API
//!
//! Start onboarding runs (background or synchronous), look up their outcome,
//! and stream their progress.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use onboard_core::error::PipelineError;
use onboard_core::pipeline::{PipelineRequest, PipelineState};

use super::events::progress_stream;
use super::ApiError;
use crate::{AppState, SharedState};

/// Questionnaire submission starting an onboarding run
#[derive(Debug, Deserialize, ToSchema)]
pub struct OnboardingRequest {
    /// Questions in intake order
    pub questions: Vec<String>,
    /// Answers keyed by question index
    #[serde(default)]
    pub answers: BTreeMap<usize, String>,
    pub base_branch: String,
    #[serde(alias = "branch_name")]
    pub new_branch: String,
    #[serde(alias = "jira_no")]
    pub ticket: String,
}

impl From<OnboardingRequest> for PipelineRequest {
    fn from(req: OnboardingRequest) -> Self {
        PipelineRequest {
            questions: req.questions,
            answers: req.answers,
            base_branch: req.base_branch,
            new_branch: req.new_branch,
            ticket: req.ticket,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StartResponse {
    pub workflow_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
}

/// Cached status of one workflow
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WorkflowRecord {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    /// Set when branch setup failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub final_state: Option<PipelineState>,
}

impl WorkflowRecord {
    fn running(workflow_id: &str) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            status: WorkflowStatus::Running,
            error: None,
            final_state: None,
        }
    }
}

/// Workflow records by id. Running workflows are always kept; finished ones
/// are evicted oldest first once more than `capacity` are held.
#[derive(Debug)]
pub struct WorkflowCache {
    capacity: usize,
    records: HashMap<String, WorkflowRecord>,
    /// Finished workflow ids, oldest first
    finished: VecDeque<String>,
}

impl WorkflowCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: HashMap::new(),
            finished: VecDeque::new(),
        }
    }

    pub fn start(&mut self, workflow_id: &str) {
        self.records
            .insert(workflow_id.to_string(), WorkflowRecord::running(workflow_id));
    }

    pub fn finish(&mut self, record: WorkflowRecord) {
        let id = record.workflow_id.clone();
        if self.records.insert(id.clone(), record).is_some() {
            self.finished.retain(|finished| *finished != id);
        }
        self.finished.push_back(id);

        while self.finished.len() > self.capacity {
            if let Some(oldest) = self.finished.pop_front() {
                tracing::debug!(workflow_id = %oldest, "Evicting finished workflow");
                self.records.remove(&oldest);
            }
        }
    }

    pub fn get(&self, workflow_id: &str) -> Option<&WorkflowRecord> {
        self.records.get(workflow_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn onboarding_routes() -> Router<SharedState> {
    Router::new()
        .route("/", post(start_onboarding))
        .route("/run", post(run_onboarding))
        .route("/:id", get(get_workflow))
        .route("/:id/events", get(workflow_events))
}

fn check_request(req: &OnboardingRequest) -> Result<(), ApiError> {
    if req.base_branch.trim().is_empty() {
        return Err(ApiError::bad_request("base_branch must not be empty"));
    }
    if req.new_branch.trim().is_empty() {
        return Err(ApiError::bad_request("new_branch must not be empty"));
    }
    Ok(())
}

async fn record_outcome(
    state: &AppState,
    workflow_id: &str,
    result: Result<PipelineState, PipelineError>,
) -> WorkflowRecord {
    let record = match result {
        Ok(final_state) => WorkflowRecord {
            workflow_id: workflow_id.to_string(),
            status: WorkflowStatus::Completed,
            error: None,
            final_state: Some(final_state),
        },
        Err(err) => {
            tracing::warn!(workflow_id, "Onboarding failed: {}", err);
            WorkflowRecord {
                workflow_id: workflow_id.to_string(),
                status: WorkflowStatus::Failed,
                error: Some(err.to_string()),
                final_state: None,
            }
        }
    };

    state.workflows.write().await.finish(record.clone());
    record
}

/// Start an onboarding run in the background
#[utoipa::path(
    post,
    path = "/api/v1/onboarding",
    tag = "onboarding",
    request_body = OnboardingRequest,
    responses(
        (status = 202, description = "Run started", body = StartResponse),
        (status = 400, description = "Invalid request", body = super::ApiResponse)
    )
)]
pub async fn start_onboarding(
    State(state): State<SharedState>,
    Json(req): Json<OnboardingRequest>,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    check_request(&req)?;

    let workflow_id = Uuid::new_v4().to_string();
    // Open the channel before returning so the caller can subscribe right away
    let progress = state.hub.open(&workflow_id).await;
    state.workflows.write().await.start(&workflow_id);

    let task_state = state.clone();
    let task_id = workflow_id.clone();
    let request = PipelineRequest::from(req);
    tokio::spawn(async move {
        let initial = task_state.pipeline.prepare(&task_id, request);
        let result = task_state.pipeline.run(initial, &progress).await;
        record_outcome(&task_state, &task_id, result).await;
        task_state.hub.close(&task_id).await;
    });

    tracing::info!(workflow_id = %workflow_id, "Onboarding run started");
    Ok((StatusCode::ACCEPTED, Json(StartResponse { workflow_id })))
}

/// Run onboarding to completion and return the final state
#[utoipa::path(
    post,
    path = "/api/v1/onboarding/run",
    tag = "onboarding",
    request_body = OnboardingRequest,
    responses(
        (status = 200, description = "Run completed", body = WorkflowRecord),
        (status = 400, description = "Invalid request", body = super::ApiResponse),
        (status = 502, description = "Branch setup failed", body = WorkflowRecord)
    )
)]
pub async fn run_onboarding(
    State(state): State<SharedState>,
    Json(req): Json<OnboardingRequest>,
) -> Result<(StatusCode, Json<WorkflowRecord>), ApiError> {
    check_request(&req)?;

    let workflow_id = Uuid::new_v4().to_string();
    state.workflows.write().await.start(&workflow_id);

    let result = state
        .pipeline
        .run_tracked(&state.hub, &workflow_id, req.into())
        .await;
    let record = record_outcome(&state, &workflow_id, result).await;

    let status = match record.status {
        WorkflowStatus::Failed => StatusCode::BAD_GATEWAY,
        _ => StatusCode::OK,
    };
    Ok((status, Json(record)))
}

/// Status and final state of a workflow
#[utoipa::path(
    get,
    path = "/api/v1/onboarding/{id}",
    tag = "onboarding",
    params(("id" = String, Path, description = "Workflow id")),
    responses(
        (status = 200, description = "Workflow record", body = WorkflowRecord),
        (status = 404, description = "Unknown workflow", body = super::ApiResponse)
    )
)]
pub async fn get_workflow(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowRecord>, ApiError> {
    state
        .workflows
        .read()
        .await
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Unknown workflow {}", id)))
}

/// Live progress of one workflow
#[utoipa::path(
    get,
    path = "/api/v1/onboarding/{id}/events",
    tag = "onboarding",
    params(("id" = String, Path, description = "Workflow id")),
    responses(
        (status = 200, description = "SSE stream of the workflow's progress events"),
        (status = 404, description = "Workflow unknown or already finished", body = super::ApiResponse)
    )
)]
pub async fn workflow_events(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let subscription = state
        .hub
        .subscribe(&id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Workflow {} has no open event stream", id)))?;
    Ok(progress_stream(subscription))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(id: &str) -> WorkflowRecord {
        WorkflowRecord {
            workflow_id: id.to_string(),
            status: WorkflowStatus::Failed,
            error: Some("ensure base branch failed".to_string()),
            final_state: None,
        }
    }

    #[test]
    fn test_cache_evicts_oldest_finished_workflow() {
        let mut cache = WorkflowCache::new(2);
        for id in ["a", "b", "c"] {
            cache.start(id);
            cache.finish(finished(id));
        }

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("c").map(|r| r.status), Some(WorkflowStatus::Failed));
    }

    #[test]
    fn test_cache_keeps_running_workflows() {
        let mut cache = WorkflowCache::new(1);
        cache.start("running");
        cache.start("a");
        cache.finish(finished("a"));
        cache.start("b");
        cache.finish(finished("b"));

        assert_eq!(cache.get("running").map(|r| r.status), Some(WorkflowStatus::Running));
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }
}
