//! User repository
//!
//! Accounts are only ever created and looked up: by id when a reservation
//! needs a notification recipient, by email when somebody signs in.

use crate::config::DatabaseDriver;
use crate::db::{DynDatabasePool, PoolExt};
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user, returning it with its assigned id
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Lookup is case-insensitive; emails are stored lowercased
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn count(&self) -> Result<i64>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let email = user.email.trim().to_lowercase();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("INSERT INTO users (email, password_hash, created_at) VALUES (?, ?, ?)")
                    .bind(&email)
                    .bind(&user.password_hash)
                    .bind(user.created_at)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to create user")?
                    .last_insert_rowid()
            }
            DatabaseDriver::Mysql => {
                sqlx::query("INSERT INTO users (email, password_hash, created_at) VALUES (?, ?, ?)")
                    .bind(&email)
                    .bind(&user.password_hash)
                    .bind(user.created_at)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to create user")?
                    .last_insert_id() as i64
            }
        };

        Ok(User {
            id,
            email,
            password_hash: user.password_hash.clone(),
            created_at: user.created_at,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = "SELECT id, email, password_hash, created_at FROM users WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_user_sqlite(self.pool.sqlite()?, sql, id).await,
            DatabaseDriver::Mysql => fetch_user_mysql(self.pool.mysql()?, sql, id).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = "SELECT id, email, password_hash, created_at FROM users WHERE email = ?";
        let email = email.trim().to_lowercase();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_user_sqlite(self.pool.sqlite()?, sql, email).await,
            DatabaseDriver::Mysql => fetch_user_mysql(self.pool.mysql()?, sql, email).await,
        }
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM users";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count users")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count users")?
                .get("count"),
        };
        Ok(count)
    }
}

async fn fetch_user_sqlite<'q, T>(pool: &SqlitePool, sql: &'q str, key: T) -> Result<Option<User>>
where
    T: 'q + Send + sqlx::Encode<'q, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    let row = sqlx::query(sql)
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get user")?;

    Ok(row.map(|row| User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
    }))
}

async fn fetch_user_mysql<'q, T>(pool: &MySqlPool, sql: &'q str, key: T) -> Result<Option<User>>
where
    T: 'q + Send + sqlx::Encode<'q, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
{
    let row = sqlx::query(sql)
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get user")?;

    Ok(row.map(|row| User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
    }))
}
