//! Survey upload (one ingested CSV file) types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::csv_parser::ParseError;

/// Processing state of an uploaded survey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurveyStatus {
    Processing,
    Completed,
    Error,
}

impl SurveyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurveyStatus::Processing => "processing",
            SurveyStatus::Completed => "completed",
            SurveyStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for SurveyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(SurveyStatus::Processing),
            "completed" => Ok(SurveyStatus::Completed),
            "error" => Ok(SurveyStatus::Error),
            _ => Err(format!("invalid survey status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyGetRequest {
    pub survey_id: Uuid,
}

/// One uploaded CSV file; parent of every parcel parsed from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyUpload {
    pub id: Uuid,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub status: SurveyStatus,
    pub total_rows: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SurveyUpload {
    pub fn new(id: Uuid, filename: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            filename: filename.to_string(),
            uploaded_at: now,
            status: SurveyStatus::Processing,
            total_rows: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_completed(&mut self, total_rows: u32) {
        self.status = SurveyStatus::Completed;
        self.total_rows = total_rows;
        self.updated_at = Utc::now();
    }

    pub fn mark_error(&mut self) {
        self.status = SurveyStatus::Error;
        self.updated_at = Utc::now();
    }
}

/// Request to ingest a survey CSV
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyUploadRequest {
    pub filename: String,
    pub csv_content: String,
}

/// Result of an ingestion: the stored survey plus skipped rows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyUploadResponse {
    pub survey: SurveyUpload,
    pub row_errors: Vec<ParseError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_survey_is_processing() {
        let survey = SurveyUpload::new(Uuid::nil(), "talhoes.csv");
        assert_eq!(survey.status, SurveyStatus::Processing);
        assert_eq!(survey.total_rows, 0);
        assert_eq!(survey.filename, "talhoes.csv");
    }

    #[test]
    fn test_mark_completed_sets_rows() {
        let mut survey = SurveyUpload::new(Uuid::nil(), "a.csv");
        let before = survey.updated_at;
        survey.mark_completed(100);
        assert_eq!(survey.status, SurveyStatus::Completed);
        assert_eq!(survey.total_rows, 100);
        assert!(survey.updated_at >= before);
    }

    #[test]
    fn test_mark_error() {
        let mut survey = SurveyUpload::new(Uuid::nil(), "a.csv");
        survey.mark_error();
        assert_eq!(survey.status, SurveyStatus::Error);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("error".parse::<SurveyStatus>(), Ok(SurveyStatus::Error));
        assert!("erro".parse::<SurveyStatus>().is_err());
    }

    #[test]
    fn test_upload_request_deserializes_from_camel_case() {
        let json = r#"{"filename":"a.csv","csvContent":"Id;Setor"}"#;
        let req: SurveyUploadRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.csv_content, "Id;Setor");
    }
}
