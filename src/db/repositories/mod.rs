//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for a single table.

pub mod locker;
pub mod session;
pub mod user;

pub use locker::{ClaimOutcome, LockerRepository, SqlxLockerRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
