//! Storage ports used by the services
//!
//! `db::PgStore` is the PostgreSQL implementation; `memory::InMemoryStore`
//! backs the unit tests.

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::types::{JobRecord, ParcelAggregate, PestMap, SurveyStatus, SurveyUpload};

#[async_trait]
pub trait ParcelRepository: Send + Sync {
    /// Insert all parcels or none
    async fn create_batch(&self, parcels: &[ParcelAggregate]) -> Result<(), RepositoryError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ParcelAggregate>, RepositoryError>;

    /// Replace the pest map if the stored version still equals
    /// `expected_version`. Returns the new version, or
    /// `RepositoryError::Conflict` when someone else wrote first.
    async fn update_pests(
        &self,
        id: Uuid,
        pests: &PestMap,
        expected_version: i64,
    ) -> Result<i64, RepositoryError>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &JobRecord) -> Result<(), RepositoryError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<JobRecord>, RepositoryError>;

    /// Persist the full record (status, result, errors, timestamps)
    async fn update(&self, job: &JobRecord) -> Result<(), RepositoryError>;

    /// Persist only the progress counters
    async fn update_progress(
        &self,
        id: Uuid,
        processed_items: u32,
        progress_percent: u8,
        error_count: u32,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SurveyRepository: Send + Sync {
    async fn create(&self, survey: &SurveyUpload) -> Result<(), RepositoryError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<SurveyUpload>, RepositoryError>;

    /// Newest first, with the total count ignoring pagination
    async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<SurveyUpload>, i64), RepositoryError>;

    async fn update_status(
        &self,
        id: Uuid,
        status: SurveyStatus,
        total_rows: u32,
    ) -> Result<(), RepositoryError>;
}
