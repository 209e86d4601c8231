//! Data models
//!
//! - Lockers and the reservation they may carry
//! - Users and login sessions (identity collaborator)
//! - API input types for locker administration and reservations

mod locker;
mod session;
mod user;

pub use locker::{
    CreateLockerInput, Locker, LockerSize, LockerStatus, QuoteInput, ReservationInput,
    Reservation, UpdateLockerInput,
};
pub use session::Session;
pub use user::User;
