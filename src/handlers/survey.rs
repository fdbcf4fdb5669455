//! Survey handlers: upload, get, list

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::services::ingestion::SurveyIngestionService;
use crate::types::{
    ErrorResponse, ListRequest, Request, SuccessResponse, SurveyGetRequest, SurveyUploadRequest,
};

/// Handle agro.survey.upload requests
pub async fn handle_survey_upload(
    client: Client,
    mut subscriber: Subscriber,
    ingestion: Arc<SurveyIngestionService>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let request: Request<SurveyUploadRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse survey upload request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let upload = request.payload;
        info!(
            "Survey upload '{}' received ({} bytes)",
            upload.filename,
            upload.csv_content.len()
        );

        match ingestion
            .ingest(&upload.filename, upload.csv_content.as_bytes())
            .await
        {
            Ok(response) => {
                let success = SuccessResponse::new(request.id, response);
                let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
            }
            Err(e) => {
                match &e {
                    ServiceError::Csv(_) => warn!("Survey '{}' rejected: {}", upload.filename, e),
                    _ => error!("Failed to ingest survey '{}': {}", upload.filename, e),
                }
                let error = ErrorResponse::new(request.id, e.code(), e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

/// Handle agro.survey.get requests
pub async fn handle_survey_get(
    client: Client,
    mut subscriber: Subscriber,
    ingestion: Arc<SurveyIngestionService>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let request: Request<SurveyGetRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse survey get request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let survey_id = request.payload.survey_id;
        match ingestion.get_survey(survey_id).await {
            Ok(survey) => {
                let success = SuccessResponse::new(request.id, survey);
                let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
            }
            Err(e) => {
                debug!("Survey lookup for {} failed: {}", survey_id, e);
                let error = ErrorResponse::new(request.id, e.code(), e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

/// Handle agro.survey.list requests
pub async fn handle_survey_list(
    client: Client,
    mut subscriber: Subscriber,
    ingestion: Arc<SurveyIngestionService>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let request: Request<ListRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse survey list request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        match ingestion.list_surveys(&request.payload).await {
            Ok(page) => {
                debug!("Listed {} of {} surveys", page.items.len(), page.total);
                let success = SuccessResponse::new(request.id, page);
                let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
            }
            Err(e) => {
                error!("Failed to list surveys: {}", e);
                let error = ErrorResponse::new(request.id, e.code(), e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}
