//! Shared API response types
//!
//! Locker JSON is flat: the reservation columns sit next to the locker's own
//! fields and are `null` while the locker is not reserved.

use serde::{Deserialize, Serialize};

use crate::models::{Locker, User};
use crate::services::{ReservationOutcome, TickReport};

// ============================================================================
// Locker Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockerResponse {
    pub id: i64,
    pub number: i64,
    pub size: String,
    pub price: Option<f64>,
    pub status: String,
    pub reserved_by: Option<i64>,
    pub reservation_start: Option<String>,
    pub reservation_end: Option<String>,
    pub reminder_sent: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Result of a multi-locker reservation
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResponse {
    pub lockers: Vec<LockerResponse>,
    pub total_price: f64,
}

/// Result of a manually triggered reconciliation pass
#[derive(Debug, Serialize)]
pub struct StatusUpdateResponse {
    pub message: String,
    pub report: TickReport,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatusResponse {
    pub is_running: bool,
}

// ============================================================================
// User Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
}

// ============================================================================
// Conversions
// ============================================================================

impl From<Locker> for LockerResponse {
    fn from(locker: Locker) -> Self {
        let reservation = locker.reservation.as_ref();
        Self {
            id: locker.id,
            number: locker.number,
            size: locker.size.to_string(),
            price: locker.price,
            status: locker.status.to_string(),
            reserved_by: reservation.map(|r| r.reserved_by),
            reservation_start: reservation.map(|r| r.start.to_rfc3339()),
            reservation_end: reservation.map(|r| r.end.to_rfc3339()),
            reminder_sent: reservation.is_some_and(|r| r.reminder_sent),
            created_at: locker.created_at.to_rfc3339(),
            updated_at: locker.updated_at.to_rfc3339(),
        }
    }
}

impl From<ReservationOutcome> for ReservationResponse {
    fn from(outcome: ReservationOutcome) -> Self {
        Self {
            lockers: outcome.lockers.into_iter().map(Into::into).collect(),
            total_price: outcome.total_price,
        }
    }
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
        }
    }
}
