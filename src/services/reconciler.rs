//! Expiry reconciler
//!
//! A periodic task that keeps locker state in line with the clock. Each tick
//! runs three independent sweeps:
//! - expiry: reservations whose end has passed are released, and the renter
//!   is told (best-effort, before the release)
//! - reminder: reservations ending in about `reminder_lead_hours` get one
//!   "ending soon" mail
//! - reset: lockers stuck in the `expired` status go back to available
//!
//! A failing sweep is logged and counted in the [`TickReport`]; it never stops
//! the other sweeps or future ticks. Two ticks never run at the same time.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::SchedulerConfig;
use crate::db::repositories::{LockerRepository, UserRepository};
use crate::models::Locker;
use crate::services::notification::{Notification, Notifier};

/// What a single tick did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    /// Reservations released because their window ended
    pub expired: u64,
    /// Reminders delivered and flagged
    pub reminded: u64,
    /// Lockers reset from the `expired` status
    pub reset: u64,
    /// Failed sweeps and failed deliveries
    pub failures: u64,
}

impl TickReport {
    fn is_quiet(&self) -> bool {
        self.expired == 0 && self.reminded == 0 && self.reset == 0 && self.failures == 0
    }
}

struct RunningTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct ExpiryReconciler {
    lockers: Arc<dyn LockerRepository>,
    users: Arc<dyn UserRepository>,
    notifier: Arc<dyn Notifier>,
    config: SchedulerConfig,
    /// Held for the duration of a tick
    tick_lock: Mutex<()>,
    task: Mutex<Option<RunningTask>>,
}

impl ExpiryReconciler {
    pub fn new(
        lockers: Arc<dyn LockerRepository>,
        users: Arc<dyn UserRepository>,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            lockers,
            users,
            notifier,
            config,
            tick_lock: Mutex::new(()),
            task: Mutex::new(None),
        }
    }

    /// Start ticking every `interval_secs`.
    ///
    /// Returns false when the reconciler is already running.
    pub async fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let this = Arc::clone(self);
        let period = std::time::Duration::from_secs(self.config.interval_secs.max(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => this.scheduled_tick().await,
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Expiry reconciler loop exited");
        });

        *task = Some(RunningTask { shutdown, handle });
        tracing::info!(
            "Expiry reconciler started (every {}s)",
            self.config.interval_secs
        );
        true
    }

    /// Stop ticking and wait for an in-flight tick to finish.
    ///
    /// Returns false when it was not running.
    pub async fn stop(&self) -> bool {
        let Some(running) = self.task.lock().await.take() else {
            return false;
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            tracing::error!("Expiry reconciler task failed: {}", e);
        }
        tracing::info!("Expiry reconciler stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Run one tick now, waiting for a scheduled one to finish first
    pub async fn run_once(&self) -> TickReport {
        self.run_once_at(Utc::now()).await
    }

    /// Run one tick as if the clock read `now`
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> TickReport {
        let _guard = self.tick_lock.lock().await;
        self.tick(now).await
    }

    async fn scheduled_tick(&self) {
        match self.tick_lock.try_lock() {
            Ok(_guard) => {
                self.tick(Utc::now()).await;
            }
            Err(_) => tracing::debug!("Previous reconciliation still running, tick skipped"),
        }
    }

    async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        self.expiry_sweep(now, &mut report).await;
        self.reminder_sweep(now, &mut report).await;
        self.reset_sweep(&mut report).await;

        if report.is_quiet() {
            tracing::debug!("Reconciliation tick: nothing to do");
        } else {
            tracing::info!(
                "Reconciliation tick: {} expired, {} reminded, {} reset, {} failure(s)",
                report.expired,
                report.reminded,
                report.reset,
                report.failures
            );
        }
        report
    }

    async fn expiry_sweep(&self, now: DateTime<Utc>, report: &mut TickReport) {
        let ended = match self.lockers.find_expired(now).await {
            Ok(lockers) => lockers,
            Err(e) => {
                tracing::error!("Expiry sweep failed: {:#}", e);
                report.failures += 1;
                return;
            }
        };

        for locker in &ended {
            match self.recipient(locker).await {
                Ok(Some(email)) => {
                    let notification = Notification::reservation_ended(&email, locker);
                    if let Err(e) = self.notifier.notify(&notification).await {
                        tracing::warn!(
                            "Could not notify end of reservation on locker #{}: {:#}",
                            locker.number,
                            e
                        );
                        report.failures += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Recipient lookup for locker #{} failed: {:#}", locker.number, e);
                    report.failures += 1;
                }
            }
        }

        match self.lockers.release_expired(now).await {
            Ok(released) => report.expired = released,
            Err(e) => {
                tracing::error!("Releasing expired reservations failed: {:#}", e);
                report.failures += 1;
            }
        }
    }

    async fn reminder_sweep(&self, now: DateTime<Utc>, report: &mut TickReport) {
        let target = now + Duration::hours(self.config.reminder_lead_hours);
        let tolerance = Duration::minutes(self.config.reminder_tolerance_minutes);

        let due = match self
            .lockers
            .find_reminder_due(target - tolerance, target + tolerance)
            .await
        {
            Ok(lockers) => lockers,
            Err(e) => {
                tracing::error!("Reminder sweep failed: {:#}", e);
                report.failures += 1;
                return;
            }
        };

        for locker in &due {
            match self.recipient(locker).await {
                Ok(Some(email)) => {
                    let notification = Notification::reservation_reminder(&email, locker);
                    if let Err(e) = self.notifier.notify(&notification).await {
                        // Left unflagged so the next tick in the band retries
                        tracing::warn!("Reminder for locker #{} not sent: {:#}", locker.number, e);
                        report.failures += 1;
                        continue;
                    }
                    self.flag_reminder(locker, true, report).await;
                }
                Ok(None) => {
                    tracing::debug!("No recipient for locker #{}, reminder skipped", locker.number);
                    self.flag_reminder(locker, false, report).await;
                }
                Err(e) => {
                    tracing::warn!("Recipient lookup for locker #{} failed: {:#}", locker.number, e);
                    report.failures += 1;
                }
            }
        }
    }

    async fn reset_sweep(&self, report: &mut TickReport) {
        match self.lockers.reset_expired_status().await {
            Ok(reset) => report.reset = reset,
            Err(e) => {
                tracing::error!("Reset sweep failed: {:#}", e);
                report.failures += 1;
            }
        }
    }

    /// Email of the renter holding `locker`, if any
    async fn recipient(&self, locker: &Locker) -> anyhow::Result<Option<String>> {
        let Some(reservation) = locker.reservation.as_ref() else {
            return Ok(None);
        };
        Ok(self
            .users
            .get_by_id(reservation.reserved_by)
            .await?
            .map(|u| u.email))
    }

    /// Flag the reminder on `locker`; it counts as reminded only if a mail
    /// went out and the flag landed on a still-reserved locker
    async fn flag_reminder(&self, locker: &Locker, delivered: bool, report: &mut TickReport) {
        match self.lockers.mark_reminder_sent(locker.id).await {
            Ok(true) => {
                if delivered {
                    report.reminded += 1;
                }
            }
            Ok(false) => tracing::debug!(
                "Locker #{} changed before its reminder was flagged",
                locker.number
            ),
            Err(e) => {
                tracing::error!("Could not flag reminder on locker #{}: {:#}", locker.number, e);
                report.failures += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxLockerRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool, PoolExt};
    use crate::models::{LockerSize, LockerStatus, User};
    use crate::services::notification::testing::RecordingNotifier;
    use crate::services::notification::{TEMPLATE_RESERVATION_ENDED, TEMPLATE_RESERVATION_REMINDER};

    struct Fixture {
        pool: DynDatabasePool,
        lockers: Arc<dyn LockerRepository>,
        notifier: Arc<RecordingNotifier>,
        reconciler: Arc<ExpiryReconciler>,
        user_id: i64,
    }

    async fn setup() -> Fixture {
        setup_with(SchedulerConfig::default()).await
    }

    async fn setup_with(config: SchedulerConfig) -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let lockers = SqlxLockerRepository::boxed(pool.clone());
        let users = SqlxUserRepository::boxed(pool.clone());
        let user = users
            .create(&User::new("renter@example.com".to_string(), "hash".to_string()))
            .await
            .unwrap();
        let notifier = RecordingNotifier::new();
        let reconciler = Arc::new(ExpiryReconciler::new(
            lockers.clone(),
            users,
            notifier.clone(),
            config,
        ));

        Fixture {
            pool,
            lockers,
            notifier,
            reconciler,
            user_id: user.id,
        }
    }

    impl Fixture {
        /// A locker reserved by the fixture user over `[start, end)`
        async fn reserved(&self, number: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Locker {
            self.reserved_by(number, self.user_id, start, end).await
        }

        async fn reserved_by(
            &self,
            number: i64,
            user_id: i64,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Locker {
            let locker = self
                .lockers
                .create(&Locker::new(number, LockerSize::Small, None))
                .await
                .unwrap();
            self.lockers.claim(&[locker.id], user_id, start, end).await.unwrap();
            self.lockers.get_by_id(locker.id).await.unwrap().unwrap()
        }

        async fn reload(&self, id: i64) -> Locker {
            self.lockers.get_by_id(id).await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn test_ended_reservation_is_released_and_notified_once() {
        let f = setup().await;
        let now = Utc::now();
        let locker = f
            .reserved(1, now - Duration::hours(2), now - Duration::minutes(5))
            .await;

        let report = f.reconciler.run_once_at(now).await;
        assert_eq!(report.expired, 1);
        assert_eq!(report.failures, 0);

        let released = f.reload(locker.id).await;
        assert_eq!(released.status, LockerStatus::Available);
        assert!(released.reservation.is_none());
        assert!(released.check_invariants().is_ok());

        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template, TEMPLATE_RESERVATION_ENDED);
        assert_eq!(sent[0].recipients, vec!["renter@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_reminder_sent_once_for_reservation_ending_in_a_day() {
        let f = setup().await;
        let now = Utc::now();
        let locker = f.reserved(1, now, now + Duration::hours(24)).await;

        let first = f.reconciler.run_once_at(now).await;
        assert_eq!(first.reminded, 1);
        assert!(f.reload(locker.id).await.reservation.unwrap().reminder_sent);

        let second = f.reconciler.run_once_at(now + Duration::minutes(1)).await;
        assert_eq!(second.reminded, 0);
        assert_eq!(f.notifier.sent_with_template(TEMPLATE_RESERVATION_REMINDER), 1);
    }

    #[tokio::test]
    async fn test_reminder_band_edges() {
        let f = setup().await;
        let now = Utc::now();
        let inside_low = f.reserved(1, now, now + Duration::hours(23)).await;
        let inside_high = f.reserved(2, now, now + Duration::hours(25)).await;
        let too_soon = f
            .reserved(3, now, now + Duration::hours(23) - Duration::seconds(1))
            .await;
        let too_late = f
            .reserved(4, now, now + Duration::hours(25) + Duration::seconds(1))
            .await;

        let report = f.reconciler.run_once_at(now).await;
        assert_eq!(report.reminded, 2);

        assert!(f.reload(inside_low.id).await.reservation.unwrap().reminder_sent);
        assert!(f.reload(inside_high.id).await.reservation.unwrap().reminder_sent);
        assert!(!f.reload(too_soon.id).await.reservation.unwrap().reminder_sent);
        assert!(!f.reload(too_late.id).await.reservation.unwrap().reminder_sent);
    }

    #[tokio::test]
    async fn test_second_run_changes_nothing() {
        let f = setup().await;
        let now = Utc::now();
        f.reserved(1, now - Duration::hours(3), now - Duration::hours(1))
            .await;
        f.reserved(2, now, now + Duration::hours(24)).await;

        let first = f.reconciler.run_once_at(now).await;
        assert_eq!(first.expired, 1);
        assert_eq!(first.reminded, 1);
        let sent_after_first = f.notifier.sent().len();

        let second = f.reconciler.run_once_at(now).await;
        assert_eq!(second, TickReport::default());
        assert_eq!(f.notifier.sent().len(), sent_after_first);
    }

    #[tokio::test]
    async fn test_failed_delivery_still_releases_but_retries_reminder() {
        let f = setup().await;
        let now = Utc::now();
        let ended = f
            .reserved(1, now - Duration::hours(2), now - Duration::minutes(1))
            .await;
        let upcoming = f.reserved(2, now, now + Duration::hours(24)).await;

        f.notifier.set_failing(true);
        let report = f.reconciler.run_once_at(now).await;
        assert_eq!(report.expired, 1);
        assert_eq!(report.reminded, 0);
        assert_eq!(report.failures, 2);
        assert!(f.reload(ended.id).await.is_available());
        assert!(!f.reload(upcoming.id).await.reservation.unwrap().reminder_sent);

        f.notifier.set_failing(false);
        let retry = f.reconciler.run_once_at(now + Duration::minutes(1)).await;
        assert_eq!(retry.reminded, 1);
        assert_eq!(f.notifier.sent_with_template(TEMPLATE_RESERVATION_REMINDER), 1);
    }

    #[tokio::test]
    async fn test_unknown_renter_is_released_silently() {
        let f = setup().await;
        let now = Utc::now();
        let ended = f
            .reserved_by(1, 4242, now - Duration::hours(2), now - Duration::minutes(1))
            .await;
        let upcoming = f
            .reserved_by(2, 4242, now, now + Duration::hours(24))
            .await;

        let report = f.reconciler.run_once_at(now).await;
        assert_eq!(report.expired, 1);
        assert_eq!(report.failures, 0);
        assert!(f.notifier.sent().is_empty());
        assert!(f.reload(ended.id).await.is_available());
        // Nobody to remind, flagged so it is not looked at again
        assert!(f.reload(upcoming.id).await.reservation.unwrap().reminder_sent);
    }

    /// Releases every locker it is told about while "delivering"
    struct ReleasingNotifier {
        lockers: Arc<dyn LockerRepository>,
        locker_id: i64,
    }

    #[async_trait::async_trait]
    impl Notifier for ReleasingNotifier {
        async fn notify(&self, _notification: &Notification) -> anyhow::Result<()> {
            self.lockers.release(self.locker_id).await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reminder_not_counted_when_locker_released_meanwhile() {
        let f = setup().await;
        let now = Utc::now();
        let locker = f.reserved(1, now, now + Duration::hours(24)).await;

        let users = SqlxUserRepository::boxed(f.pool.clone());
        let reconciler = ExpiryReconciler::new(
            f.lockers.clone(),
            users,
            Arc::new(ReleasingNotifier {
                lockers: f.lockers.clone(),
                locker_id: locker.id,
            }),
            SchedulerConfig::default(),
        );

        let report = reconciler.run_once_at(now).await;
        assert_eq!(report.reminded, 0);
        assert_eq!(report.failures, 0);
        assert!(f.reload(locker.id).await.is_available());
    }

    #[tokio::test]
    async fn test_recipient_lookup_failure_counts_in_expiry_sweep() {
        let f = setup().await;
        let now = Utc::now();
        let ended = f
            .reserved(1, now - Duration::hours(2), now - Duration::minutes(1))
            .await;
        sqlx::query("DROP TABLE users")
            .execute(f.pool.sqlite().unwrap())
            .await
            .unwrap();

        let report = f.reconciler.run_once_at(now).await;
        assert_eq!(report.expired, 1);
        assert_eq!(report.failures, 1);
        assert!(f.notifier.sent().is_empty());
        assert!(f.reload(ended.id).await.is_available());
    }

    #[tokio::test]
    async fn test_stuck_expired_status_is_reset() {
        let f = setup().await;
        let locker = f
            .lockers
            .create(&Locker::new(1, LockerSize::Large, None))
            .await
            .unwrap();
        sqlx::query("UPDATE lockers SET status = 'expired' WHERE id = ?")
            .bind(locker.id)
            .execute(f.pool.sqlite().unwrap())
            .await
            .unwrap();

        let report = f.reconciler.run_once().await;
        assert_eq!(report.reset, 1);
        assert!(f.reload(locker.id).await.is_available());
    }

    #[tokio::test]
    async fn test_sweep_failure_is_reported_not_raised() {
        let f = setup().await;
        sqlx::query("DROP TABLE lockers")
            .execute(f.pool.sqlite().unwrap())
            .await
            .unwrap();

        let report = f.reconciler.run_once().await;
        assert_eq!(report.failures, 3);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let f = setup_with(SchedulerConfig {
            interval_secs: 1,
            ..SchedulerConfig::default()
        })
        .await;

        assert!(!f.reconciler.is_running().await);
        assert!(f.reconciler.start().await);
        assert!(f.reconciler.is_running().await);
        assert!(!f.reconciler.start().await);

        assert!(f.reconciler.stop().await);
        assert!(!f.reconciler.is_running().await);
        assert!(!f.reconciler.stop().await);

        // Can be started again after a stop
        assert!(f.reconciler.start().await);
        assert!(f.reconciler.stop().await);
    }

    #[tokio::test]
    async fn test_scheduled_tick_releases_ended_reservation() {
        let f = setup_with(SchedulerConfig {
            interval_secs: 1,
            ..SchedulerConfig::default()
        })
        .await;
        let now = Utc::now();
        let locker = f
            .reserved(1, now - Duration::hours(1), now - Duration::minutes(1))
            .await;

        // The first interval tick fires immediately
        f.reconciler.start().await;
        let mut released = false;
        for _ in 0..50 {
            if f.reload(locker.id).await.is_available() {
                released = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        f.reconciler.stop().await;
        assert!(released);
    }

    #[tokio::test]
    async fn test_manual_run_waits_for_running_tick() {
        let f = setup().await;
        let guard = f.reconciler.tick_lock.lock().await;

        let reconciler = f.reconciler.clone();
        let manual = tokio::spawn(async move { reconciler.run_once().await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!manual.is_finished());

        // A scheduled tick gives up instead of waiting
        f.reconciler.scheduled_tick().await;

        drop(guard);
        let report = manual.await.unwrap();
        assert_eq!(report, TickReport::default());
    }
}
