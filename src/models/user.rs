//! User model
//!
//! Lockers only need to know who reserved them and where to send mail, so a
//! user is an id, an email and a password hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Email address (unique, lowercased)
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build a user that has not been persisted yet.
    ///
    /// The password must already be hashed, see `services::password::hash_password`.
    pub fn new(email: String, password_hash: String) -> Self {
        Self {
            id: 0,
            email,
            password_hash,
            created_at: Utc::now(),
        }
    }
}
