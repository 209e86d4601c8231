//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The API error type and its status mapping
//! - Body and path extractors that reject with that error type
//! - Authentication (session token from `Authorization: Bearer` or the
//!   `token` cookie)

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts, Request, State,
    },
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::config::Config;
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    ExpiryReconciler, LockerService, LockerServiceError, LoginRateLimiter, ReservationError,
    ReservationService, UserService, UserServiceError,
};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "token";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub locker_service: Arc<LockerService>,
    pub reservation_service: Arc<ReservationService>,
    pub reconciler: Arc<ExpiryReconciler>,
    pub rate_limiter: Arc<LoginRateLimiter>,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// JSON body extractor; a malformed body is a `VALIDATION_ERROR`
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Path extractor; an unparsable segment is a `VALIDATION_ERROR`
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// Error response for API errors, serialised as `{ "error": ..., "code": ... }`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "UNAVAILABLE", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", message)
    }

    /// Log the detail, answer with a generic message
    pub fn internal_error(detail: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {:#}", detail);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Internal server error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.message,
            "code": self.code,
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation_error(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::validation_error(rejection.body_text())
    }
}

impl From<ReservationError> for ApiError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::LockerNotFound(_) => Self::not_found(err.to_string()),
            ReservationError::LockerUnavailable { .. } => Self::unavailable(err.to_string()),
            ReservationError::InvalidWindow(_) | ReservationError::NoLockers => {
                Self::validation_error(err.to_string())
            }
            ReservationError::Internal(e) => Self::internal_error(e),
        }
    }
}

impl From<LockerServiceError> for ApiError {
    fn from(err: LockerServiceError) -> Self {
        match err {
            LockerServiceError::Validation(msg) => Self::validation_error(msg),
            LockerServiceError::NotFound(_) => Self::not_found(err.to_string()),
            LockerServiceError::Reservation(e) => e.into(),
            LockerServiceError::Internal(e) => Self::internal_error(e),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::Authentication(msg) => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_CREDENTIALS", msg)
            }
            UserServiceError::Validation(msg) => Self::validation_error(msg),
            UserServiceError::UserExists => {
                Self::new(StatusCode::BAD_REQUEST, "USER_EXISTS", err.to_string())
            }
            UserServiceError::Internal(e) => Self::internal_error(e),
        }
    }
}

/// Session token from the bearer header, falling back to the cookie
pub fn extract_session_token(headers: &axum::http::HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies
        .split(';')
        .filter_map(|c| c.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn test_token_from_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc-123"));
        headers.insert(header::COOKIE, HeaderValue::from_static("token=from-cookie"));

        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; token=xyz; other=1"),
        );
        assert_eq!(extract_session_token(&headers).as_deref(), Some("xyz"));

        let mut empty = HeaderMap::new();
        empty.insert(header::COOKIE, HeaderValue::from_static("token="));
        assert!(extract_session_token(&empty).is_none());
        assert!(extract_session_token(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_error_status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (ReservationError::LockerNotFound(1).into(), StatusCode::NOT_FOUND),
            (
                ReservationError::LockerUnavailable { id: 2, number: 2 }.into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                ReservationError::InvalidWindow("too long".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (LockerServiceError::NotFound(3).into(), StatusCode::NOT_FOUND),
            (
                LockerServiceError::Internal(anyhow::anyhow!("db down")).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (UserServiceError::UserExists.into(), StatusCode::BAD_REQUEST),
        ];

        for (error, status) in cases {
            assert_eq!(error.status, status, "{}", error.code);
        }
    }

    #[test]
    fn test_internal_error_hides_detail() {
        let err: ApiError = ReservationError::Internal(anyhow::anyhow!("password=hunter2")).into();
        assert_eq!(err.code, "INTERNAL_ERROR");
        assert!(!err.message.contains("hunter2"));
    }
}
