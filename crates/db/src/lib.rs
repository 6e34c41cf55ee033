//! Persistence layer for livepoll.
//!
//! The poll aggregate ([`document::Poll`]) is the unit of atomic mutation.
//! Services reach it only through the [`store::PollStore`] trait, which has
//! two implementations:
//!
//! - [`memory::MemoryPollStore`]: in-process, for tests and single-node demos
//! - [`repositories::PollRepository`]: `PostgreSQL` through sea-orm

pub mod document;
pub mod entities;
pub mod memory;
pub mod migrations;
pub mod repositories;
pub mod store;
pub mod test_utils;

pub use document::{Poll, Question, QuestionKind, Response, Tally, VoteValue};
pub use memory::MemoryPollStore;
pub use repositories::PollRepository;
pub use store::{PollMutation, PollStore};

use livepoll_common::{AppError, Config};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::log::LevelFilter;

/// Initialize database connection.
pub async fn init(config: &Config) -> Result<DatabaseConnection, AppError> {
    let mut opt = ConnectOptions::new(&config.database.url);

    opt.max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(LevelFilter::Debug);

    Database::connect(opt)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
}

/// Run pending migrations.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), AppError> {
    use sea_orm_migration::MigratorTrait;
    migrations::Migrator::up(db, None)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
}
