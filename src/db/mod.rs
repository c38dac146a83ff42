use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use crate::models::{CallbackStatus, Mission, MissionRecord, MissionResult};

pub mod queries;

pub use queries::PgMissionStore;

/// Persistence of missions and their per-picture outcomes.
#[async_trait]
pub trait MissionStore: Send + Sync {
    /// Record an accepted mission as PENDING / WAITING with its pictures.
    /// Re-submitting a serial resets it.
    async fn save_mission(&self, mission: &Mission) -> Result<(), StoreError>;

    /// Store picture outcomes and move the mission PENDING -> COMPLETED.
    ///
    /// Returns `false` when the mission is unknown or already completed; in
    /// that case nothing is written.
    async fn complete_mission(&self, result: &MissionResult) -> Result<bool, StoreError>;

    async fn callback_url(&self, task_serial: &str) -> Result<Option<String>, StoreError>;

    async fn update_callback_status(
        &self,
        task_serial: &str,
        status: CallbackStatus,
    ) -> Result<(), StoreError>;

    async fn get_mission(&self, task_serial: &str) -> Result<Option<MissionRecord>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}
