//! Locker model
//!
//! A locker is identified by its number and carries at most one reservation.
//! The reservation is stored on the locker itself rather than as a separate
//! entity, so nothing survives once it is released.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Physical size of a locker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockerSize {
    Small,
    Medium,
    Large,
}

impl LockerSize {
    /// Hourly rate multiplier applied when a locker has no explicit price
    pub fn rate_multiplier(self) -> u32 {
        match self {
            Self::Small => 1,
            Self::Medium => 2,
            Self::Large => 3,
        }
    }
}

impl fmt::Display for LockerSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Small => write!(f, "small"),
            Self::Medium => write!(f, "medium"),
            Self::Large => write!(f, "large"),
        }
    }
}

impl FromStr for LockerSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            _ => Err(anyhow::anyhow!("Invalid locker size: {}", s)),
        }
    }
}

/// Occupancy status.
///
/// `Expired` is recognised when read back from storage but never produced:
/// an ended reservation goes straight back to `Available`, and the
/// reconciler resets any `Expired` row it finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockerStatus {
    #[default]
    Available,
    Reserved,
    Expired,
}

impl fmt::Display for LockerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Reserved => write!(f, "reserved"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for LockerStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "available" => Ok(Self::Available),
            "reserved" => Ok(Self::Reserved),
            "expired" => Ok(Self::Expired),
            _ => Err(anyhow::anyhow!("Invalid locker status: {}", s)),
        }
    }
}

/// Reservation held on a locker, window is `[start, end)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub reserved_by: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Set once the "expiring soon" reminder went out
    pub reminder_sent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locker {
    pub id: i64,
    /// Unique, positive, never changes meaning once assigned
    pub number: i64,
    pub size: LockerSize,
    /// Explicit per-hour price; the size multiplier applies when absent
    pub price: Option<f64>,
    pub status: LockerStatus,
    pub reservation: Option<Reservation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Locker {
    /// A new, available locker that has not been persisted yet
    pub fn new(number: i64, size: LockerSize, price: Option<f64>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            number,
            size,
            price,
            status: LockerStatus::Available,
            reservation: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == LockerStatus::Available
    }

    /// Check the occupancy invariants.
    ///
    /// - available ⇔ no reservation
    /// - reserved ⇒ reservation with `start < end`
    pub fn check_invariants(&self) -> Result<(), String> {
        match (self.status, &self.reservation) {
            (LockerStatus::Available, Some(_)) => Err(format!(
                "locker #{} is available but still carries a reservation",
                self.number
            )),
            (LockerStatus::Reserved, None) => Err(format!(
                "locker #{} is reserved without reservation details",
                self.number
            )),
            (LockerStatus::Reserved, Some(r)) if r.start >= r.end => Err(format!(
                "locker #{} has an empty reservation window",
                self.number
            )),
            _ => Ok(()),
        }
    }
}

/// Input for creating a locker
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLockerInput {
    pub number: i64,
    pub size: String,
    #[serde(default)]
    pub price: Option<f64>,
}

/// Input for updating a locker.
///
/// Carries every field the client may send back, including the reservation
/// fields. `status` drives the transition; `reservedBy` and
/// `reservationStart` are accepted for compatibility but the reserving user
/// and start time are always taken from the request context.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLockerInput {
    pub number: Option<i64>,
    pub size: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub price: Option<Option<f64>>,
    pub status: Option<String>,
    pub reserved_by: Option<i64>,
    pub reservation_start: Option<DateTime<Utc>>,
    pub reservation_end: Option<DateTime<Utc>>,
}

/// Input for reserving one or more lockers together
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationInput {
    pub locker_ids: Vec<i64>,
    pub reservation_end: DateTime<Utc>,
}

/// Price preview request; same shape as a reservation
pub type QuoteInput = ReservationInput;

/// Distinguish an explicit `null` (clear) from an absent field (keep)
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
