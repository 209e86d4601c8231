//! Authentication API endpoints
//!
//! - POST /api/auth/register - Create an account and sign in
//! - POST /api/auth/login    - Sign in (throttled per email and per IP)
//! - POST /api/auth/logout   - Drop the current session
//! - GET  /api/auth/me       - Current user

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::IpAddr;

use crate::api::middleware::{
    extract_session_token, ApiError, ApiJson, AppState, AuthenticatedUser, SESSION_COOKIE,
};
use crate::api::responses::UserResponse;
use crate::services::user::{LoginInput, RegisterInput, UserServiceError};

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let (_, session) = state.user_service.register(body).await?;
    let headers = session_cookie(&session.id, state.config.auth.session_ttl_hours * 3600)?;

    Ok((
        StatusCode::CREATED,
        headers,
        Json(TokenResponse { token: session.id }),
    ))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(ip) = extract_ip_address(&headers) {
        if state.rate_limiter.is_ip_limited(ip).await {
            tracing::warn!("Login throttled for {}", ip);
            return Err(ApiError::rate_limited(
                "Too many requests, please try again later",
            ));
        }
        state.rate_limiter.record_ip_request(ip).await;
    }

    // Same key however the address is cased or padded
    let email = body.email.trim().to_lowercase();
    if state.rate_limiter.is_email_limited(&email).await {
        return Err(ApiError::rate_limited(
            "Too many failed attempts, please try again in 15 minutes",
        ));
    }

    let (_, session) = match state.user_service.login(body).await {
        Ok(result) => result,
        Err(e) => {
            if matches!(e, UserServiceError::Authentication(_)) {
                state.rate_limiter.record_failed_attempt(&email).await;
            }
            return Err(e.into());
        }
    };
    state.rate_limiter.clear_email_attempts(&email).await;

    let headers = session_cookie(&session.id, state.config.auth.session_ttl_hours * 3600)?;
    Ok((
        headers,
        Json(LoginResponse {
            success: true,
            token: session.id,
        }),
    ))
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;
    state.user_service.logout(&token).await?;

    Ok((StatusCode::NO_CONTENT, session_cookie("", 0)?))
}

/// GET /api/auth/me
async fn get_current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}

fn session_cookie(token: &str, max_age_secs: i64) -> Result<HeaderMap, ApiError> {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    );
    let value = HeaderValue::from_str(&cookie).map_err(ApiError::internal_error)?;

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, value);
    Ok(headers)
}

/// Client address as reported by a fronting proxy
fn extract_ip_address(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next());
    let real_ip = headers.get("x-real-ip").and_then(|h| h.to_str().ok());

    forwarded
        .or(real_ip)
        .and_then(|ip| ip.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{bearer, TestApp};
    use crate::services::notification::TEMPLATE_WELCOME;
    use axum::http::HeaderName;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_register_sets_cookie_and_welcomes() {
        let app = TestApp::spawn().await;

        let response = app
            .server
            .post("/api/auth/register")
            .json(&json!({ "email": "New@Example.com", "password": "secret" }))
            .await;
        response.assert_status(StatusCode::CREATED);

        let token = response.json::<Value>()["token"].as_str().unwrap().to_string();
        let cookie = response.header(header::SET_COOKIE);
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with(&format!("token={}", token)));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=86400"));

        assert_eq!(app.notifier.sent_with_template(TEMPLATE_WELCOME), 1);
        assert_eq!(app.me(&token).await["email"], "new@example.com");
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let app = TestApp::spawn().await;
        app.register("a@example.com").await;

        let response = app
            .server
            .post("/api/auth/register")
            .json(&json!({ "email": "a@example.com", "password": "other" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"], "User already exists");
    }

    #[tokio::test]
    async fn test_login_success_and_failure() {
        let app = TestApp::spawn().await;
        app.register("a@example.com").await;

        let bad = app
            .server
            .post("/api/auth/login")
            .json(&json!({ "email": "a@example.com", "password": "wrong" }))
            .await;
        bad.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(bad.json::<Value>()["error"], "Invalid credentials");

        let good = app
            .server
            .post("/api/auth/login")
            .json(&json!({ "email": "a@example.com", "password": "password123" }))
            .await;
        good.assert_status_ok();
        let body = good.json::<Value>();
        assert_eq!(body["success"], true);
        assert!(app.me(body["token"].as_str().unwrap()).await["id"].is_i64());
    }

    #[tokio::test]
    async fn test_login_throttled_after_failures() {
        let app = TestApp::spawn().await;
        app.register("a@example.com").await;

        for _ in 0..5 {
            app.server
                .post("/api/auth/login")
                .json(&json!({ "email": "a@example.com", "password": "wrong" }))
                .await
                .assert_status(StatusCode::BAD_REQUEST);
        }

        let response = app
            .server
            .post("/api/auth/login")
            .json(&json!({ "email": "a@example.com", "password": "password123" }))
            .await;
        response.assert_status(StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.json::<Value>()["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn test_login_throttle_ignores_email_case() {
        let app = TestApp::spawn().await;
        app.register("a@example.com").await;

        let variants = [
            "A@Example.com",
            " a@EXAMPLE.com",
            "A@EXAMPLE.COM",
            "a@example.com ",
            "A@example.com",
        ];
        for email in variants {
            app.server
                .post("/api/auth/login")
                .json(&json!({ "email": email, "password": "wrong" }))
                .await
                .assert_status(StatusCode::BAD_REQUEST);
        }

        app.server
            .post("/api/auth/login")
            .json(&json!({ "email": "a@example.com", "password": "password123" }))
            .await
            .assert_status(StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_cookie_auth_and_logout() {
        let app = TestApp::spawn().await;
        let token = app.register("a@example.com").await;
        let cookie = HeaderValue::from_str(&format!("token={}", token)).unwrap();

        let me = app
            .server
            .get("/api/auth/me")
            .add_header(header::COOKIE, cookie.clone())
            .await;
        me.assert_status_ok();
        assert_eq!(me.json::<Value>()["email"], "a@example.com");

        let logout = app
            .server
            .post("/api/auth/logout")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await;
        logout.assert_status(StatusCode::NO_CONTENT);
        assert!(logout
            .header(header::SET_COOKIE)
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));

        app.server
            .get("/api/auth/me")
            .add_header(header::COOKIE, cookie)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_extract_ip_address() {
        let mut headers = HeaderMap::new();
        assert!(extract_ip_address(&headers).is_none());

        headers.insert(
            HeaderName::from_static("x-real-ip"),
            HeaderValue::from_static("10.0.0.2"),
        );
        assert_eq!(extract_ip_address(&headers), "10.0.0.2".parse().ok());

        headers.insert(
            HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(extract_ip_address(&headers), "203.0.113.7".parse().ok());
    }
}
