//! Database layer
//!
//! Storage for lockers, users and login sessions. Two backends are
//! supported behind the `DatabasePool` trait:
//! - SQLite (default, single-binary deployment)
//! - MySQL
//!
//! ```ignore
//! use lokify::config::DatabaseConfig;
//! use lokify::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, PoolExt,
    SqliteDatabase,
};
