//! Survey CSV ingestion use case

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{DomainError, ServiceError};
use crate::repository::{ParcelRepository, SurveyRepository};
use crate::services::csv_parser::CsvParser;
use crate::services::ids::IdentifierSource;
use crate::types::{ListRequest, ListResponse, SurveyUpload, SurveyUploadResponse};

pub struct SurveyIngestionService {
    parser: CsvParser,
    ids: Arc<dyn IdentifierSource>,
    surveys: Arc<dyn SurveyRepository>,
    parcels: Arc<dyn ParcelRepository>,
}

impl SurveyIngestionService {
    pub fn new(
        ids: Arc<dyn IdentifierSource>,
        surveys: Arc<dyn SurveyRepository>,
        parcels: Arc<dyn ParcelRepository>,
    ) -> Self {
        Self {
            parser: CsvParser::new(ids.clone()),
            ids,
            surveys,
            parcels,
        }
    }

    /// Record the upload, parse it and store every parsed parcel.
    ///
    /// A rejected file leaves the survey in `error` and stores no parcels.
    pub async fn ingest(&self, filename: &str, raw: &[u8]) -> Result<SurveyUploadResponse, ServiceError> {
        let mut survey = SurveyUpload::new(self.ids.next_id(), filename);
        self.surveys.create(&survey).await?;

        let result = match self.parser.parse(raw, survey.id) {
            Ok(result) => result,
            Err(e) => {
                warn!("Survey {} ({}) rejected: {}", survey.id, filename, e);
                self.mark_error(&mut survey).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.parcels.create_batch(&result.parcels).await {
            error!("Failed to store parcels of survey {}: {}", survey.id, e);
            self.mark_error(&mut survey).await;
            return Err(e.into());
        }

        survey.mark_completed(result.total_rows as u32);
        self.surveys
            .update_status(survey.id, survey.status, survey.total_rows)
            .await?;

        info!(
            "Survey {} ({}) ingested: {} parcels, {} rows skipped",
            survey.id,
            filename,
            result.total_rows,
            result.errors.len()
        );

        Ok(SurveyUploadResponse {
            survey,
            row_errors: result.errors,
        })
    }

    pub async fn get_survey(&self, id: Uuid) -> Result<SurveyUpload, ServiceError> {
        self.surveys
            .get_by_id(id)
            .await?
            .ok_or_else(|| DomainError::SurveyNotFound(id).into())
    }

    /// One page of surveys, newest first
    pub async fn list_surveys(&self, request: &ListRequest) -> Result<ListResponse<SurveyUpload>, ServiceError> {
        let (limit, offset) = request.bounds();
        let (items, total) = self.surveys.list(limit, offset).await?;
        Ok(ListResponse {
            items,
            total,
            limit,
            offset,
        })
    }

    async fn mark_error(&self, survey: &mut SurveyUpload) {
        survey.mark_error();
        if let Err(e) = self
            .surveys
            .update_status(survey.id, survey.status, survey.total_rows)
            .await
        {
            error!("Failed to mark survey {} as error: {}", survey.id, e);
        }
    }
}
