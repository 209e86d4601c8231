//! User service
//!
//! The identity side of the application, kept small: lockers only need to
//! know which user holds them and where to send mail.
//! - registration (with a best-effort welcome mail)
//! - login / logout with server-side sessions
//! - session validation for the auth middleware

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, User};
use crate::services::notification::{Notification, Notifier};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials
    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Validation(String),

    #[error("User already exists")]
    UserExists,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Input for user registration
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
}

/// Input for user login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    notifier: Arc<dyn Notifier>,
    session_ttl: Duration,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        notifier: Arc<dyn Notifier>,
        session_ttl_hours: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            notifier,
            session_ttl: Duration::hours(session_ttl_hours),
        }
    }

    /// Create an account and sign it in
    pub async fn register(&self, input: RegisterInput) -> Result<(User, Session), UserServiceError> {
        let email = input.email.trim().to_lowercase();
        validate_email(&email)?;
        if input.password.is_empty() {
            return Err(UserServiceError::Validation("Password is required".to_string()));
        }

        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists);
        }

        let password_hash = hash_password(&input.password)?;
        let user = self
            .user_repo
            .create(&User::new(email, password_hash))
            .await
            .context("Failed to create user")?;
        tracing::info!("User {} registered", user.id);

        if let Err(e) = self
            .notifier
            .notify(&Notification::welcome(&user.email, None))
            .await
        {
            tracing::warn!("Welcome mail to user {} not sent: {:#}", user.id, e);
        }

        let session = self.open_session(&user).await?;
        Ok((user, session))
    }

    /// Check credentials and open a session
    pub async fn login(&self, input: LoginInput) -> Result<(User, Session), UserServiceError> {
        let invalid = || UserServiceError::Authentication("Invalid credentials".to_string());

        let user = self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to look up user")?
            .ok_or_else(invalid)?;

        if !verify_password(&input.password, &user.password_hash)? {
            return Err(invalid());
        }

        let session = self.open_session(&user).await?;
        Ok((user, session))
    }

    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// User behind a session token, `None` if unknown or expired
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        else {
            return Ok(None);
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::debug!("Could not drop expired session: {:#}", e);
            }
            return Ok(None);
        }

        Ok(self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    /// Purge sessions past their expiry, returning how many went
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired(Utc::now())
            .await
            .context("Failed to delete expired sessions")?)
    }

    async fn open_session(&self, user: &User) -> Result<Session, UserServiceError> {
        let session = Session::new(user.id, self.session_ttl);
        Ok(self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?)
    }
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !email.contains(' '),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(UserServiceError::Validation("A valid email is required".to_string()))
    }
}
