use crate::infra::{AppState, EngineService};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Extension;
use axum::Json;
use campaign_match::error::AppError;
use campaign_match::matching::{matching_router, AllocationRequest};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub(crate) struct BulkAllocationRequest {
    pub(crate) max_to_assign: u32,
    #[serde(default)]
    pub(crate) min_score: Option<f32>,
}

pub(crate) fn with_engine_routes(service: Arc<EngineService>) -> axum::Router {
    matching_router(service)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/allocations", post(allocate_all_endpoint))
        .route("/api/v1/allocations/cancel", post(cancel_allocation_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Runs a batch allocation for every candidate on the blocking pool. One run at a time.
pub(crate) async fn allocate_all_endpoint(
    Extension(state): Extension<AppState>,
    Json(payload): Json<BulkAllocationRequest>,
) -> Response {
    let Some(control) = state.start_allocation_job() else {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "an allocation run is already in progress" })),
        )
            .into_response();
    };

    let engine = state.engine.clone();
    let request = AllocationRequest {
        max_to_assign: payload.max_to_assign,
        min_score: payload
            .min_score
            .unwrap_or(engine.config().allocation.default_min_score),
    };
    let outcome =
        tokio::task::spawn_blocking(move || engine.allocate_all(request, &control)).await;
    state.finish_allocation_job();

    match outcome {
        Ok(Ok(report)) => {
            info!(
                candidates = report.summaries.len(),
                assigned = report.assigned_total(),
                failures = report.failures.len(),
                cancelled = report.cancelled,
                "bulk allocation finished"
            );
            (StatusCode::OK, Json(report)).into_response()
        }
        Ok(Err(err)) => AppError::from(err).into_response(),
        Err(join_error) => {
            error!(error = %join_error, "bulk allocation task aborted");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "allocation task aborted" })),
            )
                .into_response()
        }
    }
}

pub(crate) async fn cancel_allocation_endpoint(
    Extension(state): Extension<AppState>,
) -> impl IntoResponse {
    if state.cancel_allocation_job() {
        (StatusCode::ACCEPTED, Json(json!({ "status": "cancelling" })))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "status": "idle" })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::seeded_state;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 512 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json payload")
    }

    #[tokio::test]
    async fn readiness_reflects_the_flag() {
        let state = seeded_state();

        let response = readiness_endpoint(Extension(state.clone()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.readiness.store(true, Ordering::Release);
        let response = readiness_endpoint(Extension(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn bulk_allocation_covers_every_candidate() {
        let state = seeded_state();

        let response = allocate_all_endpoint(
            Extension(state.clone()),
            Json(BulkAllocationRequest {
                max_to_assign: 5,
                min_score: None,
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["summaries"].as_array().map(Vec::len), Some(3));
        assert_eq!(body["cancelled"], false);
        assert!(state.start_allocation_job().is_some());
    }

    #[tokio::test]
    async fn bulk_allocation_rejects_empty_batches() {
        let state = seeded_state();

        let response = allocate_all_endpoint(
            Extension(state),
            Json(BulkAllocationRequest {
                max_to_assign: 0,
                min_score: None,
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn concurrent_bulk_run_is_a_conflict() {
        let state = seeded_state();
        let _running = state.start_allocation_job().expect("job registered");

        let response = allocate_all_endpoint(
            Extension(state),
            Json(BulkAllocationRequest {
                max_to_assign: 5,
                min_score: None,
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn cancel_without_a_run_reports_idle() {
        let state = seeded_state();

        let response = cancel_allocation_endpoint(Extension(state))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn engine_routes_are_served_alongside_health() {
        let state = seeded_state();
        let app = with_engine_routes(state.engine.clone()).layer(Extension(state));

        let health = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("router responds");
        assert_eq!(health.status(), StatusCode::OK);

        let board = app
            .oneshot(
                Request::get("/api/v1/leaderboard?county=Travis")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router responds");
        assert_eq!(board.status(), StatusCode::OK);
        let body = json_body(board).await;
        assert_eq!(body["entries"][0]["supporter_id"], "sup-001");
    }
}
