//! Job database queries

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::types::{JobError, JobRecord, JobResult};

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    job_type: String,
    status: String,
    payload: serde_json::Value,
    result: Option<Json<JobResult>>,
    progress_percent: i16,
    total_items: i32,
    processed_items: i32,
    error_count: i32,
    error_details: Json<Vec<JobError>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = RepositoryError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            job_type: row.job_type.parse().map_err(RepositoryError::InvalidData)?,
            status: row.status.parse().map_err(RepositoryError::InvalidData)?,
            payload: row.payload,
            result: row.result.map(|r| r.0),
            progress_percent: row.progress_percent.clamp(0, 100) as u8,
            total_items: row.total_items.max(0) as u32,
            processed_items: row.processed_items.max(0) as u32,
            error_count: row.error_count.max(0) as u32,
            error_details: row.error_details.0,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn create_job(pool: &PgPool, job: &JobRecord) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO jobs (
            id, job_type, status, payload, result, progress_percent,
            total_items, processed_items, error_count, error_details,
            started_at, completed_at, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#
    )
    .bind(job.id)
    .bind(job.job_type.as_str())
    .bind(job.status.as_str())
    .bind(&job.payload)
    .bind(job.result.as_ref().map(Json))
    .bind(job.progress_percent as i16)
    .bind(job.total_items as i32)
    .bind(job.processed_items as i32)
    .bind(job.error_count as i32)
    .bind(Json(&job.error_details))
    .bind(job.started_at)
    .bind(job.completed_at)
    .bind(job.created_at)
    .bind(job.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_job(pool: &PgPool, id: Uuid) -> Result<Option<JobRecord>, RepositoryError> {
    let row = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT
            id, job_type, status, payload, result, progress_percent,
            total_items, processed_items, error_count, error_details,
            started_at, completed_at, created_at, updated_at
        FROM jobs
        WHERE id = $1
        "#
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(JobRecord::try_from).transpose()
}

/// Overwrite every mutable column of a job
pub async fn update_job(pool: &PgPool, job: &JobRecord) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r#"
        UPDATE jobs SET
            status = $2,
            result = $3,
            progress_percent = $4,
            total_items = $5,
            processed_items = $6,
            error_count = $7,
            error_details = $8,
            started_at = $9,
            completed_at = $10,
            updated_at = $11
        WHERE id = $1
        "#
    )
    .bind(job.id)
    .bind(job.status.as_str())
    .bind(job.result.as_ref().map(Json))
    .bind(job.progress_percent as i16)
    .bind(job.total_items as i32)
    .bind(job.processed_items as i32)
    .bind(job.error_count as i32)
    .bind(Json(&job.error_details))
    .bind(job.started_at)
    .bind(job.completed_at)
    .bind(job.updated_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound(format!("job {}", job.id)));
    }
    Ok(())
}

pub async fn update_job_progress(
    pool: &PgPool,
    id: Uuid,
    processed_items: u32,
    progress_percent: u8,
    error_count: u32,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET processed_items = $2, progress_percent = $3, error_count = $4, updated_at = NOW()
        WHERE id = $1
        "#
    )
    .bind(id)
    .bind(processed_items as i32)
    .bind(progress_percent as i16)
    .bind(error_count as i32)
    .execute(pool)
    .await?;

    Ok(())
}
