//! User API endpoints
//!
//! - GET /api/users/{id} - Public profile of a user (requires auth)

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};

use crate::api::middleware::{ApiError, ApiPath, AppState};
use crate::api::responses::UserResponse;

pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", get(get_user))
}

async fn get_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .user_service
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User {} not found", id)))?;
    Ok(Json(user.into()))
}
