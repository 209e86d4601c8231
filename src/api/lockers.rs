//! Locker API endpoints
//!
//! All routes require authentication:
//! - GET    /api/lockers                   - List lockers
//! - POST   /api/lockers                   - Create a locker
//! - GET    /api/lockers/{id}              - Get one locker
//! - PUT    /api/lockers/{id}              - Edit a locker (may reserve or release it)
//! - DELETE /api/lockers/{id}              - Remove a locker
//! - POST   /api/lockers/reservations      - Reserve several lockers at once
//! - POST   /api/lockers/quote             - Price a reservation without making it
//! - POST   /api/lockers/update-statuses   - Run one reconciliation pass now
//! - GET    /api/lockers/scheduler/status  - Whether the reconciler is ticking

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::api::middleware::{ApiError, ApiJson, ApiPath, AppState, AuthenticatedUser};
use crate::api::responses::{
    LockerResponse, ReservationResponse, SchedulerStatusResponse, StatusUpdateResponse,
};
use crate::models::{CreateLockerInput, QuoteInput, ReservationInput, UpdateLockerInput};
use crate::services::Quote;

/// Build the locker router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_lockers).post(create_locker))
        .route("/reservations", post(reserve_lockers))
        .route("/quote", post(quote_lockers))
        .route("/update-statuses", post(update_statuses))
        .route("/scheduler/status", get(scheduler_status))
        .route(
            "/{id}",
            get(get_locker).put(update_locker).delete(delete_locker),
        )
}

/// GET /api/lockers
async fn list_lockers(State(state): State<AppState>) -> Result<Json<Vec<LockerResponse>>, ApiError> {
    let lockers = state.locker_service.list().await?;
    Ok(Json(lockers.into_iter().map(Into::into).collect()))
}

/// POST /api/lockers
async fn create_locker(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateLockerInput>,
) -> Result<impl IntoResponse, ApiError> {
    let locker = state.locker_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(LockerResponse::from(locker))))
}

/// GET /api/lockers/{id}
async fn get_locker(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<LockerResponse>, ApiError> {
    let locker = state.locker_service.get(id).await?;
    Ok(Json(locker.into()))
}

/// PUT /api/lockers/{id}
///
/// A status change to `reserved` reserves the locker for the caller.
async fn update_locker(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateLockerInput>,
) -> Result<Json<LockerResponse>, ApiError> {
    let locker = state.locker_service.update(id, body, user.0.id).await?;
    Ok(Json(locker.into()))
}

/// DELETE /api/lockers/{id}
async fn delete_locker(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.locker_service.delete(id).await?;
    Ok(Json(json!({ "message": "Locker deleted" })))
}

/// POST /api/lockers/reservations
async fn reserve_lockers(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(body): ApiJson<ReservationInput>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let outcome = state
        .reservation_service
        .reserve(&body.locker_ids, user.0.id, body.reservation_end)
        .await?;
    Ok(Json(outcome.into()))
}

/// POST /api/lockers/quote
async fn quote_lockers(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<QuoteInput>,
) -> Result<Json<Quote>, ApiError> {
    let quote = state
        .reservation_service
        .quote(&body.locker_ids, body.reservation_end)
        .await?;
    Ok(Json(quote))
}

/// POST /api/lockers/update-statuses
async fn update_statuses(State(state): State<AppState>) -> Json<StatusUpdateResponse> {
    let report = state.reconciler.run_once().await;
    Json(StatusUpdateResponse {
        message: "Locker statuses updated".to_string(),
        report,
    })
}

/// GET /api/lockers/scheduler/status
async fn scheduler_status(State(state): State<AppState>) -> Json<SchedulerStatusResponse> {
    Json(SchedulerStatusResponse {
        is_running: state.reconciler.is_running().await,
    })
}
