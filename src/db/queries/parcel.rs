//! Parcel database queries

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::types::{ParcelAggregate, PestMap, SurveyFields};

#[derive(Debug, FromRow)]
struct ParcelRow {
    id: Uuid,
    survey_id: Uuid,
    external_id: String,
    sector: String,
    sector2: String,
    farm_code: String,
    farm_description: String,
    block: String,
    cut: i32,
    total_area: f64,
    soil_texture: String,
    current_cut: i32,
    renewal: String,
    harvest_month: String,
    restriction: String,
    pest_data: Json<PestMap>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ParcelRow> for ParcelAggregate {
    fn from(row: ParcelRow) -> Self {
        Self {
            id: row.id,
            survey_id: row.survey_id,
            fields: SurveyFields {
                external_id: row.external_id,
                sector: row.sector,
                sector2: row.sector2,
                farm_code: row.farm_code,
                farm_description: row.farm_description,
                block: row.block,
                cut: row.cut,
                total_area: row.total_area,
                soil_texture: row.soil_texture,
                current_cut: row.current_cut,
                renewal: row.renewal,
                harvest_month: row.harvest_month,
                restriction: row.restriction,
            },
            pests: row.pest_data.0,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Insert parcels in a single transaction
pub async fn create_parcels(pool: &PgPool, parcels: &[ParcelAggregate]) -> Result<(), RepositoryError> {
    let mut tx = pool.begin().await?;

    for parcel in parcels {
        let f = &parcel.fields;
        sqlx::query(
            r#"
            INSERT INTO parcels (
                id, survey_id, external_id, sector, sector2, farm_code, farm_description,
                block, cut, total_area, soil_texture, current_cut, renewal,
                harvest_month, restriction, pest_data, version, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7,
                $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19
            )
            "#
        )
        .bind(parcel.id)
        .bind(parcel.survey_id)
        .bind(&f.external_id)
        .bind(&f.sector)
        .bind(&f.sector2)
        .bind(&f.farm_code)
        .bind(&f.farm_description)
        .bind(&f.block)
        .bind(f.cut)
        .bind(f.total_area)
        .bind(&f.soil_texture)
        .bind(f.current_cut)
        .bind(&f.renewal)
        .bind(&f.harvest_month)
        .bind(&f.restriction)
        .bind(Json(&parcel.pests))
        .bind(parcel.version)
        .bind(parcel.created_at)
        .bind(parcel.updated_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Get parcel by ID
pub async fn get_parcel(pool: &PgPool, id: Uuid) -> Result<Option<ParcelAggregate>, RepositoryError> {
    let row = sqlx::query_as::<_, ParcelRow>(
        r#"
        SELECT
            id, survey_id, external_id, sector, sector2, farm_code, farm_description,
            block, cut, total_area, soil_texture, current_cut, renewal,
            harvest_month, restriction, pest_data, version, created_at, updated_at
        FROM parcels
        WHERE id = $1
        "#
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(ParcelAggregate::from))
}

/// Compare-and-swap the pest map on `version`
pub async fn update_parcel_pests(
    pool: &PgPool,
    id: Uuid,
    pests: &PestMap,
    expected_version: i64,
) -> Result<i64, RepositoryError> {
    let updated: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE parcels
        SET pest_data = $2, version = version + 1, updated_at = NOW()
        WHERE id = $1 AND version = $3
        RETURNING version
        "#
    )
    .bind(id)
    .bind(Json(pests))
    .bind(expected_version)
    .fetch_optional(pool)
    .await?;

    if let Some((version,)) = updated {
        return Ok(version);
    }

    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM parcels WHERE id = $1)")
        .bind(id)
        .fetch_one(pool)
        .await?;

    if exists {
        Err(RepositoryError::Conflict(id))
    } else {
        Err(RepositoryError::NotFound(format!("parcel {}", id)))
    }
}
