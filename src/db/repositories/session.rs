//! Session repository
//!
//! Login sessions keyed by their opaque token.

use crate::config::DatabaseDriver;
use crate::db::{DynDatabasePool, PoolExt};
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by token
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete sessions that expired before `now`, returning how many went
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        let sql = "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&session.id)
                    .bind(session.user_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to create session")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&session.id)
                    .bind(session.user_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to create session")?;
            }
        }

        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let sql = "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?";
        let session = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get session")?
                .map(|row| Session {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    expires_at: row.get("expires_at"),
                    created_at: row.get("created_at"),
                }),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get session")?
                .map(|row| Session {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    expires_at: row.get("expires_at"),
                    created_at: row.get("created_at"),
                }),
        };
        Ok(session)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let sql = "DELETE FROM sessions WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to delete session")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to delete session")?;
            }
        }
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let sql = "DELETE FROM sessions WHERE expires_at < ?";
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
        };
        Ok(result)
    }
}
