//! Locker repository
//!
//! Database operations for lockers and the reservation state they carry.
//!
//! This module provides:
//! - `LockerRepository` trait defining the interface for locker data access
//! - `SqlxLockerRepository` implementing the trait for SQLite and MySQL
//!
//! Every status transition is written with a guard on the current status so
//! that a concurrent writer which got there first is never overwritten.

use crate::config::DatabaseDriver;
use crate::db::{DynDatabasePool, PoolExt};
use crate::models::{Locker, LockerSize, LockerStatus, Reservation};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const LOCKER_COLUMNS: &str = "id, number, size, price, status, reserved_by, \
     reservation_start, reservation_end, reminder_sent, created_at, updated_at";

/// Result of an all-or-nothing claim
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// Every requested locker is now reserved
    Claimed(Vec<Locker>),
    /// The given locker was not available at write time; nothing was changed
    Conflict(i64),
}

/// Locker repository trait
#[async_trait]
pub trait LockerRepository: Send + Sync {
    /// Insert a new locker
    async fn create(&self, locker: &Locker) -> Result<Locker>;

    /// Get locker by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Locker>>;

    /// Get locker by its number
    async fn get_by_number(&self, number: i64) -> Result<Option<Locker>>;

    /// List all lockers ordered by number
    async fn list(&self) -> Result<Vec<Locker>>;

    /// Write number, size and price; status and reservation are untouched
    async fn update_attributes(&self, locker: &Locker) -> Result<Locker>;

    /// Delete a locker, returning whether it existed
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Reserve every locker in `ids` for `user_id` over `[start, end)`, or none
    async fn claim(
        &self,
        ids: &[i64],
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ClaimOutcome>;

    /// Make a locker available and clear its reservation
    async fn release(&self, id: i64) -> Result<Option<Locker>>;

    /// Reserved lockers whose window ended before `now`
    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Locker>>;

    /// Release every reserved locker whose window ended before `now`
    async fn release_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Reserved lockers without a reminder whose end lies in `[from, to]`
    async fn find_reminder_due(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Locker>>;

    /// Flag the reminder as sent; false if the locker is no longer reserved
    /// or was already flagged
    async fn mark_reminder_sent(&self, id: i64) -> Result<bool>;

    /// Reset lockers left in the `expired` status to available
    async fn reset_expired_status(&self) -> Result<u64>;
}

/// SQLx-based locker repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxLockerRepository {
    pool: DynDatabasePool,
}

impl SqlxLockerRepository {
    /// Create a new SQLx locker repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LockerRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl LockerRepository for SqlxLockerRepository {
    async fn create(&self, locker: &Locker) -> Result<Locker> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_locker_sqlite(self.pool.sqlite()?, locker).await,
            DatabaseDriver::Mysql => create_locker_mysql(self.pool.mysql()?, locker).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Locker>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_locker_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_locker_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_by_number(&self, number: i64) -> Result<Option<Locker>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_locker_by_number_sqlite(self.pool.sqlite()?, number).await
            }
            DatabaseDriver::Mysql => get_locker_by_number_mysql(self.pool.mysql()?, number).await,
        }
    }

    async fn list(&self) -> Result<Vec<Locker>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_lockers_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => list_lockers_mysql(self.pool.mysql()?).await,
        }
    }

    async fn update_attributes(&self, locker: &Locker) -> Result<Locker> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_locker_attributes_sqlite(self.pool.sqlite()?, locker).await
            }
            DatabaseDriver::Mysql => {
                update_locker_attributes_mysql(self.pool.mysql()?, locker).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_locker_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_locker_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn claim(
        &self,
        ids: &[i64],
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                claim_lockers_sqlite(self.pool.sqlite()?, ids, user_id, start, end).await
            }
            DatabaseDriver::Mysql => {
                claim_lockers_mysql(self.pool.mysql()?, ids, user_id, start, end).await
            }
        }
    }

    async fn release(&self, id: i64) -> Result<Option<Locker>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => release_locker_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => release_locker_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Locker>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => find_expired_sqlite(self.pool.sqlite()?, now).await,
            DatabaseDriver::Mysql => find_expired_mysql(self.pool.mysql()?, now).await,
        }
    }

    async fn release_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => release_expired_sqlite(self.pool.sqlite()?, now).await,
            DatabaseDriver::Mysql => release_expired_mysql(self.pool.mysql()?, now).await,
        }
    }

    async fn find_reminder_due(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Locker>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => find_reminder_due_sqlite(self.pool.sqlite()?, from, to).await,
            DatabaseDriver::Mysql => find_reminder_due_mysql(self.pool.mysql()?, from, to).await,
        }
    }

    async fn mark_reminder_sent(&self, id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => mark_reminder_sent_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => mark_reminder_sent_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn reset_expired_status(&self) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => reset_expired_status_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => reset_expired_status_mysql(self.pool.mysql()?).await,
        }
    }
}

/// Raw column values shared by both backends
struct LockerRow {
    id: i64,
    number: i64,
    size: String,
    price: Option<f64>,
    status: String,
    reserved_by: Option<i64>,
    reservation_start: Option<DateTime<Utc>>,
    reservation_end: Option<DateTime<Utc>>,
    reminder_sent: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LockerRow {
    fn into_locker(self) -> Result<Locker> {
        let size = LockerSize::from_str(&self.size)
            .with_context(|| format!("Invalid size in database: {}", self.size))?;
        let status = LockerStatus::from_str(&self.status)
            .with_context(|| format!("Invalid status in database: {}", self.status))?;

        let reservation = match (self.reserved_by, self.reservation_start, self.reservation_end) {
            (Some(reserved_by), Some(start), Some(end)) => Some(Reservation {
                reserved_by,
                start,
                end,
                reminder_sent: self.reminder_sent,
            }),
            _ => None,
        };

        Ok(Locker {
            id: self.id,
            number: self.number,
            size,
            price: self.price,
            status,
            reservation,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_locker_sqlite(pool: &SqlitePool, locker: &Locker) -> Result<Locker> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO lockers (number, size, price, status, created_at, updated_at)
        VALUES (?, ?, ?, 'available', ?, ?)
        "#,
    )
    .bind(locker.number)
    .bind(locker.size.to_string())
    .bind(locker.price)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create locker")?;

    Ok(Locker {
        id: result.last_insert_rowid(),
        number: locker.number,
        size: locker.size,
        price: locker.price,
        status: LockerStatus::Available,
        reservation: None,
        created_at: now,
        updated_at: now,
    })
}

async fn get_locker_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Locker>> {
    let sql = format!("SELECT {} FROM lockers WHERE id = ?", LOCKER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get locker by ID")?;

    row.map(|r| row_to_locker_sqlite(&r)).transpose()
}

async fn get_locker_by_number_sqlite(pool: &SqlitePool, number: i64) -> Result<Option<Locker>> {
    let sql = format!("SELECT {} FROM lockers WHERE number = ?", LOCKER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(number)
        .fetch_optional(pool)
        .await
        .context("Failed to get locker by number")?;

    row.map(|r| row_to_locker_sqlite(&r)).transpose()
}

async fn list_lockers_sqlite(pool: &SqlitePool) -> Result<Vec<Locker>> {
    let sql = format!("SELECT {} FROM lockers ORDER BY number", LOCKER_COLUMNS);
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to list lockers")?;

    rows.iter().map(row_to_locker_sqlite).collect()
}

async fn update_locker_attributes_sqlite(pool: &SqlitePool, locker: &Locker) -> Result<Locker> {
    let now = Utc::now();
    sqlx::query("UPDATE lockers SET number = ?, size = ?, price = ?, updated_at = ? WHERE id = ?")
        .bind(locker.number)
        .bind(locker.size.to_string())
        .bind(locker.price)
        .bind(now)
        .bind(locker.id)
        .execute(pool)
        .await
        .context("Failed to update locker")?;

    get_locker_by_id_sqlite(pool, locker.id)
        .await?
        .with_context(|| format!("Locker {} disappeared during update", locker.id))
}

async fn delete_locker_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM lockers WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete locker")?;

    Ok(result.rows_affected() > 0)
}

async fn claim_lockers_sqlite(
    pool: &SqlitePool,
    ids: &[i64],
    user_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<ClaimOutcome> {
    let mut tx = pool.begin().await.context("Failed to begin claim transaction")?;

    for &id in ids {
        let result = sqlx::query(
            r#"
            UPDATE lockers
            SET status = 'reserved', reserved_by = ?, reservation_start = ?,
                reservation_end = ?, reminder_sent = 0, updated_at = ?
            WHERE id = ? AND status = 'available'
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .bind(start)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to claim locker")?;

        if result.rows_affected() == 0 {
            tx.rollback().await.context("Failed to roll back claim")?;
            return Ok(ClaimOutcome::Conflict(id));
        }
    }

    let sql = format!("SELECT {} FROM lockers WHERE id = ?", LOCKER_COLUMNS);
    let mut claimed = Vec::with_capacity(ids.len());
    for &id in ids {
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to read claimed locker")?;
        claimed.push(row_to_locker_sqlite(&row)?);
    }

    tx.commit().await.context("Failed to commit claim")?;
    Ok(ClaimOutcome::Claimed(claimed))
}

async fn release_locker_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Locker>> {
    let result = sqlx::query(
        r#"
        UPDATE lockers
        SET status = 'available', reserved_by = NULL, reservation_start = NULL,
            reservation_end = NULL, reminder_sent = 0, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to release locker")?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_locker_by_id_sqlite(pool, id).await
}

async fn find_expired_sqlite(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<Locker>> {
    let sql = format!(
        "SELECT {} FROM lockers WHERE status = 'reserved' AND reservation_end < ? ORDER BY number",
        LOCKER_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(now)
        .fetch_all(pool)
        .await
        .context("Failed to find expired lockers")?;

    rows.iter().map(row_to_locker_sqlite).collect()
}

async fn release_expired_sqlite(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE lockers
        SET status = 'available', reserved_by = NULL, reservation_start = NULL,
            reservation_end = NULL, reminder_sent = 0, updated_at = ?
        WHERE status = 'reserved' AND reservation_end < ?
        "#,
    )
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to release expired lockers")?;

    Ok(result.rows_affected())
}

async fn find_reminder_due_sqlite(
    pool: &SqlitePool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<Locker>> {
    let sql = format!(
        "SELECT {} FROM lockers WHERE status = 'reserved' AND reminder_sent = 0 \
         AND reservation_end >= ? AND reservation_end <= ? ORDER BY number",
        LOCKER_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
        .context("Failed to find lockers due for a reminder")?;

    rows.iter().map(row_to_locker_sqlite).collect()
}

async fn mark_reminder_sent_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE lockers SET reminder_sent = 1, updated_at = ? \
         WHERE id = ? AND status = 'reserved' AND reminder_sent = 0",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to mark reminder as sent")?;

    Ok(result.rows_affected() > 0)
}

async fn reset_expired_status_sqlite(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE lockers
        SET status = 'available', reserved_by = NULL, reservation_start = NULL,
            reservation_end = NULL, reminder_sent = 0, updated_at = ?
        WHERE status = 'expired'
        "#,
    )
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to reset expired lockers")?;

    Ok(result.rows_affected())
}

fn row_to_locker_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Locker> {
    LockerRow {
        id: row.get("id"),
        number: row.get("number"),
        size: row.get("size"),
        price: row.get("price"),
        status: row.get("status"),
        reserved_by: row.get("reserved_by"),
        reservation_start: row.get("reservation_start"),
        reservation_end: row.get("reservation_end"),
        reminder_sent: row.get("reminder_sent"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
    .into_locker()
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_locker_mysql(pool: &MySqlPool, locker: &Locker) -> Result<Locker> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO lockers (number, size, price, status, created_at, updated_at)
        VALUES (?, ?, ?, 'available', ?, ?)
        "#,
    )
    .bind(locker.number)
    .bind(locker.size.to_string())
    .bind(locker.price)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create locker")?;

    Ok(Locker {
        id: result.last_insert_id() as i64,
        number: locker.number,
        size: locker.size,
        price: locker.price,
        status: LockerStatus::Available,
        reservation: None,
        created_at: now,
        updated_at: now,
    })
}

async fn get_locker_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Locker>> {
    let sql = format!("SELECT {} FROM lockers WHERE id = ?", LOCKER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get locker by ID")?;

    row.map(|r| row_to_locker_mysql(&r)).transpose()
}

async fn get_locker_by_number_mysql(pool: &MySqlPool, number: i64) -> Result<Option<Locker>> {
    let sql = format!("SELECT {} FROM lockers WHERE number = ?", LOCKER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(number)
        .fetch_optional(pool)
        .await
        .context("Failed to get locker by number")?;

    row.map(|r| row_to_locker_mysql(&r)).transpose()
}

async fn list_lockers_mysql(pool: &MySqlPool) -> Result<Vec<Locker>> {
    let sql = format!("SELECT {} FROM lockers ORDER BY number", LOCKER_COLUMNS);
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to list lockers")?;

    rows.iter().map(row_to_locker_mysql).collect()
}

async fn update_locker_attributes_mysql(pool: &MySqlPool, locker: &Locker) -> Result<Locker> {
    let now = Utc::now();
    sqlx::query("UPDATE lockers SET number = ?, size = ?, price = ?, updated_at = ? WHERE id = ?")
        .bind(locker.number)
        .bind(locker.size.to_string())
        .bind(locker.price)
        .bind(now)
        .bind(locker.id)
        .execute(pool)
        .await
        .context("Failed to update locker")?;

    get_locker_by_id_mysql(pool, locker.id)
        .await?
        .with_context(|| format!("Locker {} disappeared during update", locker.id))
}

async fn delete_locker_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM lockers WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete locker")?;

    Ok(result.rows_affected() > 0)
}

async fn claim_lockers_mysql(
    pool: &MySqlPool,
    ids: &[i64],
    user_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<ClaimOutcome> {
    let mut tx = pool.begin().await.context("Failed to begin claim transaction")?;

    for &id in ids {
        let result = sqlx::query(
            r#"
            UPDATE lockers
            SET status = 'reserved', reserved_by = ?, reservation_start = ?,
                reservation_end = ?, reminder_sent = FALSE, updated_at = ?
            WHERE id = ? AND status = 'available'
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .bind(start)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to claim locker")?;

        if result.rows_affected() == 0 {
            tx.rollback().await.context("Failed to roll back claim")?;
            return Ok(ClaimOutcome::Conflict(id));
        }
    }

    let sql = format!("SELECT {} FROM lockers WHERE id = ?", LOCKER_COLUMNS);
    let mut claimed = Vec::with_capacity(ids.len());
    for &id in ids {
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to read claimed locker")?;
        claimed.push(row_to_locker_mysql(&row)?);
    }

    tx.commit().await.context("Failed to commit claim")?;
    Ok(ClaimOutcome::Claimed(claimed))
}

async fn release_locker_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Locker>> {
    if get_locker_by_id_mysql(pool, id).await?.is_none() {
        return Ok(None);
    }

    sqlx::query(
        r#"
        UPDATE lockers
        SET status = 'available', reserved_by = NULL, reservation_start = NULL,
            reservation_end = NULL, reminder_sent = FALSE, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to release locker")?;

    get_locker_by_id_mysql(pool, id).await
}

async fn find_expired_mysql(pool: &MySqlPool, now: DateTime<Utc>) -> Result<Vec<Locker>> {
    let sql = format!(
        "SELECT {} FROM lockers WHERE status = 'reserved' AND reservation_end < ? ORDER BY number",
        LOCKER_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(now)
        .fetch_all(pool)
        .await
        .context("Failed to find expired lockers")?;

    rows.iter().map(row_to_locker_mysql).collect()
}

async fn release_expired_mysql(pool: &MySqlPool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE lockers
        SET status = 'available', reserved_by = NULL, reservation_start = NULL,
            reservation_end = NULL, reminder_sent = FALSE, updated_at = ?
        WHERE status = 'reserved' AND reservation_end < ?
        "#,
    )
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to release expired lockers")?;

    Ok(result.rows_affected())
}

async fn find_reminder_due_mysql(
    pool: &MySqlPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<Locker>> {
    let sql = format!(
        "SELECT {} FROM lockers WHERE status = 'reserved' AND reminder_sent = FALSE \
         AND reservation_end >= ? AND reservation_end <= ? ORDER BY number",
        LOCKER_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
        .context("Failed to find lockers due for a reminder")?;

    rows.iter().map(row_to_locker_mysql).collect()
}

async fn mark_reminder_sent_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE lockers SET reminder_sent = TRUE, updated_at = ? \
         WHERE id = ? AND status = 'reserved' AND reminder_sent = FALSE",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to mark reminder as sent")?;

    Ok(result.rows_affected() > 0)
}

async fn reset_expired_status_mysql(pool: &MySqlPool) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE lockers
        SET status = 'available', reserved_by = NULL, reservation_start = NULL,
            reservation_end = NULL, reminder_sent = FALSE, updated_at = ?
        WHERE status = 'expired'
        "#,
    )
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to reset expired lockers")?;

    Ok(result.rows_affected())
}

fn row_to_locker_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Locker> {
    LockerRow {
        id: row.get("id"),
        number: row.get("number"),
        size: row.get("size"),
        price: row.get("price"),
        status: row.get("status"),
        reserved_by: row.get("reserved_by"),
        reservation_start: row.get("reservation_start"),
        reservation_end: row.get("reservation_end"),
        reminder_sent: row.get("reminder_sent"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
    .into_locker()
}
