use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::allocation::{AllocationRequest, AssignmentRole, AssignmentStatus};
use super::domain::{CandidateId, EntityRef, SupporterId};
use super::error::EngineError;
use super::events::{EngineEvent, EventDispatcher};
use super::leaderboard::LeaderboardScope;
use super::repository::{ActivityLedger, ProfileStore, StoreError};
use super::service::MatchingService;

type SharedService<S, L> = State<Arc<MatchingService<S, L>>>;

/// Router builder exposing the engine operations over JSON.
pub fn matching_router<S, L>(service: Arc<MatchingService<S, L>>) -> Router
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    Router::new()
        .route("/api/v1/events", post(event_handler::<S, L>))
        .route("/api/v1/recalcs", post(recalc_handler::<S, L>))
        .route(
            "/api/v1/supporters/:supporter_id/grade",
            post(grade_handler::<S, L>),
        )
        .route(
            "/api/v1/supporters/:supporter_id/dimensions",
            post(supporter_dimensions_handler::<S, L>),
        )
        .route(
            "/api/v1/candidates/:candidate_id/dimensions",
            post(candidate_dimensions_handler::<S, L>),
        )
        .route(
            "/api/v1/affinity/:supporter_id/:candidate_id",
            get(affinity_handler::<S, L>),
        )
        .route(
            "/api/v1/candidates/:candidate_id/allocations",
            post(batch_allocation_handler::<S, L>),
        )
        .route(
            "/api/v1/candidates/:candidate_id/assignments",
            post(manual_assignment_handler::<S, L>),
        )
        .route(
            "/api/v1/supporters/:supporter_id/allocation",
            post(single_allocation_handler::<S, L>),
        )
        .route(
            "/api/v1/assignments/:supporter_id/:candidate_id/status",
            post(assignment_status_handler::<S, L>),
        )
        .route("/api/v1/leaderboard", get(leaderboard_handler::<S, L>))
        .with_state(service)
}

/// Maps engine failures onto status codes with a JSON `{ "error", "code" }` body.
pub(crate) fn error_response(error: EngineError) -> Response {
    let status = match &error {
        EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::NotFound(_) | EngineError::Store(StoreError::NotFound) => {
            StatusCode::NOT_FOUND
        }
        EngineError::StaleData { .. }
        | EngineError::ConcurrencyConflict(_)
        | EngineError::Store(StoreError::Conflict)
        | EngineError::Store(StoreError::DuplicateId(_))
        | EngineError::Store(StoreError::VersionMismatch { .. }) => StatusCode::CONFLICT,
        EngineError::Store(StoreError::Unavailable(_)) | EngineError::Ledger(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    let payload = json!({
        "error": error.to_string(),
        "code": error.code(),
    });
    (status, axum::Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(result: Result<T, EngineError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, axum::Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

/// Runs a store-bound allocation on the blocking pool so large supporter pools do
/// not stall the async workers.
async fn respond_blocking<T, F>(operation: &'static str, task: F) -> Response
where
    T: serde::Serialize + Send + 'static,
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
{
    match tokio::task::spawn_blocking(task).await {
        Ok(result) => respond(result),
        Err(join_error) => {
            error!(operation, error = %join_error, "allocation task aborted");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(json!({ "error": "allocation task aborted", "code": "internal" })),
            )
                .into_response()
        }
    }
}

pub(crate) async fn event_handler<S, L>(
    State(service): SharedService<S, L>,
    axum::Json(event): axum::Json<EngineEvent>,
) -> Response
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    let dispatcher = EventDispatcher::new(service);
    respond(dispatcher.dispatch(event))
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecalcParams {
    #[serde(default = "default_recalc_limit")]
    limit: usize,
}

fn default_recalc_limit() -> usize {
    100
}

pub(crate) async fn recalc_handler<S, L>(
    State(service): SharedService<S, L>,
    Query(params): Query<RecalcParams>,
) -> Response
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    respond(service.process_deferred_recalcs(params.limit))
}

pub(crate) async fn grade_handler<S, L>(
    State(service): SharedService<S, L>,
    Path(supporter_id): Path<String>,
) -> Response
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    let id = SupporterId(supporter_id);
    match service.recompute_grade(&id) {
        Ok(outcome) if outcome.is_deferred() => {
            (StatusCode::ACCEPTED, axum::Json(outcome)).into_response()
        }
        other => respond(other),
    }
}

pub(crate) async fn supporter_dimensions_handler<S, L>(
    State(service): SharedService<S, L>,
    Path(supporter_id): Path<String>,
) -> Response
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    respond(service.refresh_dimensions(&EntityRef::Supporter(SupporterId(supporter_id))))
}

pub(crate) async fn candidate_dimensions_handler<S, L>(
    State(service): SharedService<S, L>,
    Path(candidate_id): Path<String>,
) -> Response
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    respond(service.refresh_dimensions(&EntityRef::Candidate(CandidateId(candidate_id))))
}

pub(crate) async fn affinity_handler<S, L>(
    State(service): SharedService<S, L>,
    Path((supporter_id, candidate_id)): Path<(String, String)>,
) -> Response
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    respond(service.compute_affinity(&SupporterId(supporter_id), &CandidateId(candidate_id)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchAllocationBody {
    max_to_assign: u32,
    #[serde(default)]
    min_score: Option<f32>,
}

pub(crate) async fn batch_allocation_handler<S, L>(
    State(service): SharedService<S, L>,
    Path(candidate_id): Path<String>,
    axum::Json(body): axum::Json<BatchAllocationBody>,
) -> Response
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    let request = AllocationRequest {
        max_to_assign: body.max_to_assign,
        min_score: body
            .min_score
            .unwrap_or(service.config().allocation.default_min_score),
    };
    let candidate_id = CandidateId(candidate_id);
    respond_blocking("allocate_batch", move || {
        service.allocate_batch(&candidate_id, request)
    })
    .await
}

#[derive(Debug, Deserialize)]
pub(crate) struct ManualAssignmentBody {
    supporter_id: String,
    #[serde(default)]
    role: Option<AssignmentRole>,
}

pub(crate) async fn manual_assignment_handler<S, L>(
    State(service): SharedService<S, L>,
    Path(candidate_id): Path<String>,
    axum::Json(body): axum::Json<ManualAssignmentBody>,
) -> Response
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    respond(service.create_manual_assignment(
        &SupporterId(body.supporter_id),
        &CandidateId(candidate_id),
        body.role,
    ))
}

pub(crate) async fn single_allocation_handler<S, L>(
    State(service): SharedService<S, L>,
    Path(supporter_id): Path<String>,
) -> Response
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    let supporter_id = SupporterId(supporter_id);
    respond_blocking("allocate_for_supporter", move || {
        service
            .allocate_for_supporter(&supporter_id)
            .map(|assignment| json!({ "assignment": assignment }))
    })
    .await
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusBody {
    status: AssignmentStatus,
}

pub(crate) async fn assignment_status_handler<S, L>(
    State(service): SharedService<S, L>,
    Path((supporter_id, candidate_id)): Path<(String, String)>,
    axum::Json(body): axum::Json<StatusBody>,
) -> Response
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    respond(service.update_assignment_status(
        &SupporterId(supporter_id),
        &CandidateId(candidate_id),
        body.status,
    ))
}

#[derive(Debug, Deserialize)]
pub(crate) struct LeaderboardParams {
    #[serde(default)]
    county: Option<String>,
    #[serde(default)]
    candidate_id: Option<String>,
}

impl LeaderboardParams {
    fn scope(self) -> LeaderboardScope {
        match (self.candidate_id, self.county) {
            (Some(candidate_id), _) => LeaderboardScope::Candidate(CandidateId(candidate_id)),
            (None, Some(county)) => LeaderboardScope::County(county),
            (None, None) => LeaderboardScope::State,
        }
    }
}

pub(crate) async fn leaderboard_handler<S, L>(
    State(service): SharedService<S, L>,
    Query(params): Query<LeaderboardParams>,
) -> Response
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    respond(service.build_leaderboard(&params.scope()))
}
