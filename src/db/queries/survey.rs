//! Survey upload database queries

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::types::{SurveyStatus, SurveyUpload};

#[derive(Debug, FromRow)]
struct SurveyRow {
    id: Uuid,
    filename: String,
    uploaded_at: DateTime<Utc>,
    status: String,
    total_rows: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SurveyRow> for SurveyUpload {
    type Error = RepositoryError;

    fn try_from(row: SurveyRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            filename: row.filename,
            uploaded_at: row.uploaded_at,
            status: row.status.parse().map_err(RepositoryError::InvalidData)?,
            total_rows: row.total_rows.max(0) as u32,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn create_survey(pool: &PgPool, survey: &SurveyUpload) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO surveys (id, filename, uploaded_at, status, total_rows, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#
    )
    .bind(survey.id)
    .bind(&survey.filename)
    .bind(survey.uploaded_at)
    .bind(survey.status.as_str())
    .bind(survey.total_rows as i32)
    .bind(survey.created_at)
    .bind(survey.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_survey(pool: &PgPool, id: Uuid) -> Result<Option<SurveyUpload>, RepositoryError> {
    let row = sqlx::query_as::<_, SurveyRow>(
        r#"
        SELECT id, filename, uploaded_at, status, total_rows, created_at, updated_at
        FROM surveys
        WHERE id = $1
        "#
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(SurveyUpload::try_from).transpose()
}

/// List surveys, newest first, plus the unpaginated total
pub async fn list_surveys(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<(Vec<SurveyUpload>, i64), RepositoryError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM surveys")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query_as::<_, SurveyRow>(
        r#"
        SELECT id, filename, uploaded_at, status, total_rows, created_at, updated_at
        FROM surveys
        ORDER BY created_at DESC, id DESC
        LIMIT $1 OFFSET $2
        "#
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let surveys = rows
        .into_iter()
        .map(SurveyUpload::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((surveys, total))
}

pub async fn update_survey_status(
    pool: &PgPool,
    id: Uuid,
    status: SurveyStatus,
    total_rows: u32,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE surveys SET status = $2, total_rows = $3, updated_at = NOW() WHERE id = $1"
    )
    .bind(id)
    .bind(status.as_str())
    .bind(total_rows as i32)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound(format!("survey {}", id)));
    }
    Ok(())
}
