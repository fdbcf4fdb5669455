//! Job submission and status lookup

use std::sync::Arc;

use tracing::{error, info};

use crate::error::{DomainError, ServiceError};
use crate::repository::JobRepository;
use crate::services::ids::IdentifierSource;
use crate::services::queue::{QueueTransport, BULK_APPLICATIONS_QUEUE};
use crate::types::{
    BulkApplicationsPayload, JobError, JobPayload, JobRecord, JobStatusResponse, JobSubmitResponse,
    QueueMessage,
};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("failed to encode job payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("failed to enqueue job {job_id}: {message}")]
    Enqueue { job_id: uuid::Uuid, message: String },
}

impl SubmitError {
    pub fn code(&self) -> &'static str {
        match self {
            SubmitError::Service(e) => e.code(),
            SubmitError::Payload(_) => "INVALID_REQUEST",
            SubmitError::Enqueue { .. } => "QUEUE_ERROR",
        }
    }
}

pub struct JobService {
    ids: Arc<dyn IdentifierSource>,
    jobs: Arc<dyn JobRepository>,
    queue: Arc<dyn QueueTransport>,
}

impl JobService {
    pub fn new(
        ids: Arc<dyn IdentifierSource>,
        jobs: Arc<dyn JobRepository>,
        queue: Arc<dyn QueueTransport>,
    ) -> Self {
        Self { ids, jobs, queue }
    }

    /// Persist a pending bulk-applications job and put it on the queue.
    ///
    /// If the queue rejects it, the stored job is failed before returning.
    pub async fn create_bulk_applications_job(
        &self,
        payload: BulkApplicationsPayload,
    ) -> Result<JobSubmitResponse, SubmitError> {
        let payload = JobPayload::BulkApplications(payload);
        let item_count = payload.item_count();
        let mut job = JobRecord::new(self.ids.next_id(), &payload)?;
        self.jobs.create(&job).await.map_err(ServiceError::from)?;

        let message = QueueMessage::new(&job, BULK_APPLICATIONS_QUEUE);
        if let Err(e) = self.queue.enqueue(&message, BULK_APPLICATIONS_QUEUE).await {
            error!("Failed to enqueue job {}: {}", job.id, e);
            if job.fail(vec![JobError::message(format!("failed to enqueue job: {}", e))]).is_ok() {
                if let Err(store_err) = self.jobs.update(&job).await {
                    error!("Failed to mark job {} as failed: {}", job.id, store_err);
                }
            }
            return Err(SubmitError::Enqueue {
                job_id: job.id,
                message: e.to_string(),
            });
        }

        info!("Bulk applications job {} submitted: {} items", job.id, item_count);

        Ok(JobSubmitResponse {
            job_id: job.id,
            status: job.status,
            message: format!("Job queued with {} applications", item_count),
        })
    }

    pub async fn get_job_status(&self, job_id: uuid::Uuid) -> Result<JobStatusResponse, ServiceError> {
        let job = self
            .jobs
            .get_by_id(job_id)
            .await?
            .ok_or(DomainError::JobNotFound(job_id))?;

        Ok(JobStatusResponse::from(&job))
    }
}
