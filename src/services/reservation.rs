//! Reservation manager
//!
//! Moves lockers from available to reserved, all or nothing. The window
//! always starts at server time; the caller only chooses when it ends.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::db::repositories::{ClaimOutcome, LockerRepository};
use crate::models::Locker;
use crate::services::pricing::{self, Quote};

/// Reservation errors
#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("Locker {0} not found")]
    LockerNotFound(i64),

    #[error("Locker #{number} is not available")]
    LockerUnavailable { id: i64, number: i64 },

    #[error("Invalid reservation window: {0}")]
    InvalidWindow(String),

    #[error("At least one locker must be selected")]
    NoLockers,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Lockers reserved by one request and what they cost together
#[derive(Debug, Clone)]
pub struct ReservationOutcome {
    pub lockers: Vec<Locker>,
    pub total_price: f64,
}

pub struct ReservationService {
    repo: Arc<dyn LockerRepository>,
    max_window: Duration,
}

impl ReservationService {
    pub fn new(repo: Arc<dyn LockerRepository>, max_days: i64) -> Self {
        Self {
            repo,
            max_window: Duration::days(max_days),
        }
    }

    /// Reserve `ids` for `user_id` from now until `end`
    pub async fn reserve(
        &self,
        ids: &[i64],
        user_id: i64,
        end: DateTime<Utc>,
    ) -> Result<ReservationOutcome, ReservationError> {
        self.reserve_at(ids, user_id, end, Utc::now()).await
    }

    /// Reserve with an explicit `now`.
    ///
    /// Availability is checked up front for a precise error, then enforced
    /// again at write time by the repository claim.
    pub async fn reserve_at(
        &self,
        ids: &[i64],
        user_id: i64,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ReservationOutcome, ReservationError> {
        let ids = dedupe(ids);
        if ids.is_empty() {
            return Err(ReservationError::NoLockers);
        }
        self.validate_window(now, end)?;

        for locker in self.load_all(&ids).await? {
            if !locker.is_available() {
                return Err(ReservationError::LockerUnavailable {
                    id: locker.id,
                    number: locker.number,
                });
            }
        }

        match self.repo.claim(&ids, user_id, now, end).await? {
            ClaimOutcome::Claimed(lockers) => {
                let total_price = pricing::total_price(&lockers, now, end);
                tracing::info!(
                    "User {} reserved {} locker(s) until {} for {}",
                    user_id,
                    lockers.len(),
                    end,
                    total_price
                );
                Ok(ReservationOutcome {
                    lockers,
                    total_price,
                })
            }
            ClaimOutcome::Conflict(id) => {
                tracing::debug!("Lost reservation race on locker {}", id);
                match self.repo.get_by_id(id).await? {
                    Some(locker) => Err(ReservationError::LockerUnavailable {
                        id,
                        number: locker.number,
                    }),
                    None => Err(ReservationError::LockerNotFound(id)),
                }
            }
        }
    }

    /// Price `ids` over a window ending at `end`, without reserving anything
    pub async fn quote_at(
        &self,
        ids: &[i64],
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Quote, ReservationError> {
        let ids = dedupe(ids);
        if ids.is_empty() {
            return Err(ReservationError::NoLockers);
        }
        self.validate_window(now, end)?;

        let lockers = self.load_all(&ids).await?;
        Ok(pricing::quote(&lockers, now, end))
    }

    pub async fn quote(&self, ids: &[i64], end: DateTime<Utc>) -> Result<Quote, ReservationError> {
        self.quote_at(ids, end, Utc::now()).await
    }

    /// End a reservation early, returning the now available locker
    pub async fn release(&self, id: i64) -> Result<Locker, ReservationError> {
        let locker = self
            .repo
            .release(id)
            .await?
            .ok_or(ReservationError::LockerNotFound(id))?;
        tracing::info!("Locker #{} released", locker.number);
        Ok(locker)
    }

    /// The end must lie in the future and within the allowed window
    pub fn validate_window(
        &self,
        now: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), ReservationError> {
        if end <= now {
            return Err(ReservationError::InvalidWindow(
                "reservation end must be in the future".to_string(),
            ));
        }
        if end > now + self.max_window {
            return Err(ReservationError::InvalidWindow(format!(
                "reservation cannot last longer than {} days",
                self.max_window.num_days()
            )));
        }
        Ok(())
    }

    async fn load_all(&self, ids: &[i64]) -> Result<Vec<Locker>, ReservationError> {
        let mut lockers = Vec::with_capacity(ids.len());
        for &id in ids {
            let locker = self
                .repo
                .get_by_id(id)
                .await?
                .ok_or(ReservationError::LockerNotFound(id))?;
            lockers.push(locker);
        }
        Ok(lockers)
    }
}

/// Drop repeated ids, keeping first-seen order
fn dedupe(ids: &[i64]) -> Vec<i64> {
    let mut seen = Vec::with_capacity(ids.len());
    for &id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxLockerRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::models::{LockerSize, LockerStatus};

    async fn setup() -> (Arc<dyn LockerRepository>, ReservationService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxLockerRepository::boxed(pool);
        let service = ReservationService::new(repo.clone(), 7);
        (repo, service)
    }

    async fn add_locker(repo: &Arc<dyn LockerRepository>, number: i64, size: LockerSize) -> Locker {
        repo.create(&Locker::new(number, size, None))
            .await
            .expect("Failed to create locker")
    }

    #[tokio::test]
    async fn test_reserve_single_locker_is_priced_by_started_hour() {
        let (repo, service) = setup().await;
        let locker = add_locker(&repo, 12, LockerSize::Medium).await;

        let now = Utc::now();
        let end = now + Duration::hours(3) + Duration::minutes(10);
        let outcome = service.reserve_at(&[locker.id], 5, end, now).await.unwrap();

        assert_eq!(outcome.total_price, 8.0);
        let reserved = &outcome.lockers[0];
        assert_eq!(reserved.status, LockerStatus::Reserved);
        let reservation = reserved.reservation.as_ref().unwrap();
        assert_eq!(reservation.reserved_by, 5);
        assert_eq!(reservation.start, now);
        assert_eq!(reservation.end, end);
        assert!(!reservation.reminder_sent);
    }

    #[tokio::test]
    async fn test_reserve_two_lockers_together() {
        let (repo, service) = setup().await;
        let small = add_locker(&repo, 1, LockerSize::Small).await;
        let large = add_locker(&repo, 2, LockerSize::Large).await;

        let now = Utc::now();
        let outcome = service
            .reserve_at(&[small.id, large.id], 1, now + Duration::hours(2), now)
            .await
            .unwrap();

        assert_eq!(outcome.lockers.len(), 2);
        assert_eq!(outcome.total_price, 8.0);
    }

    #[tokio::test]
    async fn test_unavailable_locker_rejects_whole_request() {
        let (repo, service) = setup().await;
        let small = add_locker(&repo, 1, LockerSize::Small).await;
        let large = add_locker(&repo, 2, LockerSize::Large).await;

        let now = Utc::now();
        service
            .reserve_at(&[large.id], 2, now + Duration::hours(2), now)
            .await
            .unwrap();

        let err = service
            .reserve_at(&[small.id, large.id], 1, now + Duration::hours(2), now)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReservationError::LockerUnavailable { number: 2, .. }
        ));

        let untouched = repo.get_by_id(small.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, LockerStatus::Available);
        assert!(untouched.reservation.is_none());
    }

    #[tokio::test]
    async fn test_missing_locker_rejects_whole_request() {
        let (repo, service) = setup().await;
        let locker = add_locker(&repo, 1, LockerSize::Small).await;

        let now = Utc::now();
        let err = service
            .reserve_at(&[locker.id, 999], 1, now + Duration::hours(1), now)
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::LockerNotFound(999)));
        assert!(repo.get_by_id(locker.id).await.unwrap().unwrap().is_available());
    }

    #[tokio::test]
    async fn test_window_bounds() {
        let (repo, service) = setup().await;
        let locker = add_locker(&repo, 1, LockerSize::Small).await;
        let now = Utc::now();

        for end in [
            now,
            now - Duration::minutes(1),
            now + Duration::days(7) + Duration::seconds(1),
        ] {
            let err = service.reserve_at(&[locker.id], 1, end, now).await.unwrap_err();
            assert!(matches!(err, ReservationError::InvalidWindow(_)));
        }
        assert!(repo.get_by_id(locker.id).await.unwrap().unwrap().is_available());

        // Exactly seven days is allowed
        service
            .reserve_at(&[locker.id], 1, now + Duration::days(7), now)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_and_duplicate_ids() {
        let (repo, service) = setup().await;
        let locker = add_locker(&repo, 1, LockerSize::Large).await;
        let now = Utc::now();

        let err = service
            .reserve_at(&[], 1, now + Duration::hours(1), now)
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::NoLockers));

        let outcome = service
            .reserve_at(&[locker.id, locker.id], 1, now + Duration::hours(1), now)
            .await
            .unwrap();
        assert_eq!(outcome.lockers.len(), 1);
        assert_eq!(outcome.total_price, 3.0);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_have_one_winner() {
        let (repo, service) = setup().await;
        let locker = add_locker(&repo, 1, LockerSize::Small).await;
        let service = Arc::new(service);
        let end = Utc::now() + Duration::hours(1);

        let handles: Vec<_> = (1..=4)
            .map(|user| {
                let service = service.clone();
                let id = locker.id;
                tokio::spawn(async move { service.reserve(&[id], user, end).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(ReservationError::LockerUnavailable { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_quote_does_not_reserve() {
        let (repo, service) = setup().await;
        let a = add_locker(&repo, 1, LockerSize::Small).await;
        let b = add_locker(&repo, 2, LockerSize::Medium).await;
        let now = Utc::now();

        let quote = service
            .quote_at(&[a.id, b.id], now + Duration::minutes(61), now)
            .await
            .unwrap();
        assert_eq!(quote.hours, 2);
        assert_eq!(quote.total_price, 6.0);
        assert!(repo.get_by_id(a.id).await.unwrap().unwrap().is_available());
    }

    #[tokio::test]
    async fn test_release() {
        let (repo, service) = setup().await;
        let locker = add_locker(&repo, 1, LockerSize::Small).await;
        let now = Utc::now();
        service
            .reserve_at(&[locker.id], 1, now + Duration::hours(1), now)
            .await
            .unwrap();

        let released = service.release(locker.id).await.unwrap();
        assert!(released.is_available());
        assert!(released.check_invariants().is_ok());

        assert!(matches!(
            service.release(404).await,
            Err(ReservationError::LockerNotFound(404))
        ));
    }
}
