//! Lokify - locker rental service
//!
//! Lockers are reserved in groups for an hourly price; a background
//! reconciler releases them once their reservation ends and reminds renters
//! the day before.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
