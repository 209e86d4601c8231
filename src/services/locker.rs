//! Locker administration
//!
//! Inventory management on top of the locker repository. Status changes that
//! arrive through an edit are delegated to the reservation manager so that
//! admin edits and reservations obey the same transitions.

use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::db::repositories::LockerRepository;
use crate::models::{CreateLockerInput, Locker, LockerSize, LockerStatus, UpdateLockerInput};
use crate::services::reservation::{ReservationError, ReservationService};

/// Locker service errors
#[derive(Debug, Error)]
pub enum LockerServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Locker {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Reservation(#[from] ReservationError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub struct LockerService {
    repo: Arc<dyn LockerRepository>,
    reservations: Arc<ReservationService>,
}

impl LockerService {
    pub fn new(repo: Arc<dyn LockerRepository>, reservations: Arc<ReservationService>) -> Self {
        Self { repo, reservations }
    }

    /// Add a locker to the inventory; it starts out available
    pub async fn create(&self, input: CreateLockerInput) -> Result<Locker, LockerServiceError> {
        if input.number <= 0 {
            return Err(LockerServiceError::Validation(
                "Locker number must be a positive integer".to_string(),
            ));
        }
        let size = parse_size(&input.size)?;
        validate_price(input.price)?;

        if self.repo.get_by_number(input.number).await?.is_some() {
            return Err(LockerServiceError::Validation(format!(
                "Locker number {} already exists",
                input.number
            )));
        }

        let locker = self
            .repo
            .create(&Locker::new(input.number, size, input.price))
            .await?;
        tracing::info!("Locker #{} created ({})", locker.number, locker.size);
        Ok(locker)
    }

    pub async fn get(&self, id: i64) -> Result<Locker, LockerServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or(LockerServiceError::NotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<Locker>, LockerServiceError> {
        Ok(self.repo.list().await?)
    }

    /// Apply an edit on behalf of `actor_id`.
    ///
    /// The whole input is validated before anything is written. A status of
    /// `reserved` reserves the locker for the actor until `reservationEnd`,
    /// `available` releases it, `expired` is never accepted. Asking for a
    /// locker someone else holds is `LockerUnavailable`; the holder may
    /// re-send their own reservation unchanged.
    pub async fn update(
        &self,
        id: i64,
        input: UpdateLockerInput,
        actor_id: i64,
    ) -> Result<Locker, LockerServiceError> {
        let current = self.get(id).await?;

        let mut edited = current.clone();
        if let Some(number) = input.number {
            if number != current.number {
                return Err(LockerServiceError::Validation(
                    "Locker number cannot be changed".to_string(),
                ));
            }
        }
        if let Some(size) = input.size.as_deref() {
            edited.size = parse_size(size)?;
        }
        if let Some(price) = input.price {
            validate_price(price)?;
            edited.price = price;
        }
        let status = input
            .status
            .as_deref()
            .map(|s| {
                LockerStatus::from_str(s).map_err(|e| LockerServiceError::Validation(e.to_string()))
            })
            .transpose()?;

        let now = Utc::now();
        let transition = match status {
            Some(LockerStatus::Expired) => {
                return Err(LockerServiceError::Validation(
                    "Status 'expired' cannot be set directly".to_string(),
                ));
            }
            Some(LockerStatus::Reserved) => {
                self.plan_reservation(&current, input.reservation_end, actor_id, now)?
            }
            Some(LockerStatus::Available) if current.status != LockerStatus::Available => {
                Transition::Release
            }
            _ => Transition::None,
        };

        if edited.size != current.size || edited.price != current.price {
            self.repo.update_attributes(&edited).await?;
        }

        match transition {
            Transition::Reserve(end) => {
                self.reservations.reserve_at(&[id], actor_id, end, now).await?;
            }
            Transition::Release => {
                self.reservations.release(id).await?;
            }
            Transition::None => {}
        }

        self.get(id).await
    }

    fn plan_reservation(
        &self,
        current: &Locker,
        end: Option<DateTime<Utc>>,
        actor_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Transition, LockerServiceError> {
        if current.status == LockerStatus::Reserved {
            if let Some(held) = &current.reservation {
                let unchanged = end.map_or(true, |end| end == held.end);
                if held.reserved_by == actor_id && unchanged {
                    return Ok(Transition::None);
                }
            }
        }
        if !current.is_available() {
            return Err(ReservationError::LockerUnavailable {
                id: current.id,
                number: current.number,
            }
            .into());
        }

        let end = end.ok_or_else(|| {
            LockerServiceError::Validation(
                "reservationEnd is required to reserve a locker".to_string(),
            )
        })?;
        self.reservations.validate_window(now, end)?;
        Ok(Transition::Reserve(end))
    }

    pub async fn delete(&self, id: i64) -> Result<(), LockerServiceError> {
        if !self.repo.delete(id).await? {
            return Err(LockerServiceError::NotFound(id));
        }
        tracing::info!("Locker {} deleted", id);
        Ok(())
    }
}

/// Status change requested by an edit, decided before any write
enum Transition {
    None,
    Reserve(DateTime<Utc>),
    Release,
}

fn parse_size(size: &str) -> Result<LockerSize, LockerServiceError> {
    LockerSize::from_str(size).map_err(|e| LockerServiceError::Validation(e.to_string()))
}

fn validate_price(price: Option<f64>) -> Result<(), LockerServiceError> {
    match price {
        Some(p) if !p.is_finite() || p < 0.0 => Err(LockerServiceError::Validation(
            "Price must be a non-negative number".to_string(),
        )),
        _ => Ok(()),
    }
}
