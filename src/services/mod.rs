//! Services layer - Business logic
//!
//! - Pricing and the reservation state machine
//! - Locker administration
//! - The periodic expiry reconciler
//! - Notifications, users and sessions

pub mod locker;
pub mod notification;
pub mod password;
pub mod pricing;
pub mod rate_limiter;
pub mod reconciler;
pub mod reservation;
pub mod user;

pub use locker::{LockerService, LockerServiceError};
pub use notification::{
    create_notifier, LogNotifier, Notification, Notifier, SmtpNotifier, TemplateRenderer,
};
pub use password::{hash_password, verify_password};
pub use pricing::{Quote, QuoteLine};
pub use rate_limiter::LoginRateLimiter;
pub use reconciler::{ExpiryReconciler, TickReport};
pub use reservation::{ReservationError, ReservationOutcome, ReservationService};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
