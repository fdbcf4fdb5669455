//! Database module

pub mod queries;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::repository::{JobRepository, ParcelRepository, SurveyRepository};
use crate::types::{JobRecord, ParcelAggregate, PestMap, SurveyStatus, SurveyUpload};

/// Create a database connection pool
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Run database migrations.
///
/// Stored checksums are first synced with the embedded migrations so a
/// CRLF/LF difference in a checked-out file does not block startup.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");

    let migrator = sqlx::migrate!("./migrations");

    fix_migration_checksums(pool, &migrator).await?;
    migrator.run(pool).await?;

    info!("Database migrations complete");
    Ok(())
}

async fn fix_migration_checksums(pool: &PgPool, migrator: &sqlx::migrate::Migrator) -> Result<()> {
    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = '_sqlx_migrations')"
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(());
    }

    for migration in migrator.iter() {
        if migration.migration_type.is_down_migration() {
            continue;
        }

        let stored: Option<(Vec<u8>,)> = sqlx::query_as(
            "SELECT checksum FROM _sqlx_migrations WHERE version = $1"
        )
        .bind(migration.version)
        .fetch_optional(pool)
        .await?;

        if let Some((stored_checksum,)) = stored {
            let current_checksum: &[u8] = &migration.checksum;
            if stored_checksum != current_checksum {
                warn!(
                    "Migration {} ({}) checksum mismatch, updating stored checksum",
                    migration.version, migration.description
                );
                sqlx::query("UPDATE _sqlx_migrations SET checksum = $1 WHERE version = $2")
                    .bind(current_checksum)
                    .bind(migration.version)
                    .execute(pool)
                    .await?;
            }
        }
    }

    Ok(())
}

/// PostgreSQL-backed implementation of the repository ports
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParcelRepository for PgStore {
    async fn create_batch(&self, parcels: &[ParcelAggregate]) -> Result<(), RepositoryError> {
        queries::parcel::create_parcels(&self.pool, parcels).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ParcelAggregate>, RepositoryError> {
        queries::parcel::get_parcel(&self.pool, id).await
    }

    async fn update_pests(
        &self,
        id: Uuid,
        pests: &PestMap,
        expected_version: i64,
    ) -> Result<i64, RepositoryError> {
        queries::parcel::update_parcel_pests(&self.pool, id, pests, expected_version).await
    }
}

#[async_trait]
impl JobRepository for PgStore {
    async fn create(&self, job: &JobRecord) -> Result<(), RepositoryError> {
        queries::job::create_job(&self.pool, job).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<JobRecord>, RepositoryError> {
        queries::job::get_job(&self.pool, id).await
    }

    async fn update(&self, job: &JobRecord) -> Result<(), RepositoryError> {
        queries::job::update_job(&self.pool, job).await
    }

    async fn update_progress(
        &self,
        id: Uuid,
        processed_items: u32,
        progress_percent: u8,
        error_count: u32,
    ) -> Result<(), RepositoryError> {
        queries::job::update_job_progress(&self.pool, id, processed_items, progress_percent, error_count)
            .await
    }
}

#[async_trait]
impl SurveyRepository for PgStore {
    async fn create(&self, survey: &SurveyUpload) -> Result<(), RepositoryError> {
        queries::survey::create_survey(&self.pool, survey).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<SurveyUpload>, RepositoryError> {
        queries::survey::get_survey(&self.pool, id).await
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<SurveyUpload>, i64), RepositoryError> {
        queries::survey::list_surveys(&self.pool, limit, offset).await
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: SurveyStatus,
        total_rows: u32,
    ) -> Result<(), RepositoryError> {
        queries::survey::update_survey_status(&self.pool, id, status, total_rows).await
    }
}
