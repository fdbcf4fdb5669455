//! Job handlers: bulk submission and status polling

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tracing::{debug, error};
use uuid::Uuid;

use crate::services::job_service::{JobService, SubmitError};
use crate::types::{
    BulkApplicationsPayload, ErrorResponse, JobStatusRequest, Request, SuccessResponse,
};

fn submit_error_response(request_id: Uuid, e: &SubmitError) -> ErrorResponse {
    let response = ErrorResponse::new(request_id, e.code(), e.to_string());
    match e {
        SubmitError::Enqueue { job_id, .. } => {
            response.with_details(serde_json::json!({ "jobId": job_id }))
        }
        _ => response,
    }
}

/// Handle agro.jobs.bulk_applications.submit requests
pub async fn handle_bulk_applications_submit(
    client: Client,
    mut subscriber: Subscriber,
    jobs: Arc<JobService>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let request: Request<BulkApplicationsPayload> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse bulk applications request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        match jobs.create_bulk_applications_job(request.payload).await {
            Ok(response) => {
                let success = SuccessResponse::new(request.id, response);
                let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
            }
            Err(e) => {
                error!("Failed to submit bulk applications job: {}", e);
                let error = submit_error_response(request.id, &e);
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

/// Handle agro.jobs.status requests
pub async fn handle_job_status(
    client: Client,
    mut subscriber: Subscriber,
    jobs: Arc<JobService>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let request: Request<JobStatusRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse job status request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let job_id = request.payload.job_id;
        match jobs.get_job_status(job_id).await {
            Ok(status) => {
                debug!("Job {} is {} ({}%)", job_id, status.status, status.progress);
                let success = SuccessResponse::new(request.id, status);
                let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
            }
            Err(e) => {
                debug!("Job status lookup for {} failed: {}", job_id, e);
                let error = ErrorResponse::new(request.id, e.code(), e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}
