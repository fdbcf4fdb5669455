//! Bulk job worker
//!
//! Single sequential consumer of the bulk-applications queue.
//!
//! ```text
//! loop {
//!     1. Stop if cancelled
//!     2. Dequeue (waits at most one poll interval)
//!     3. Reload the job; skip missing or finished ones
//!     4. Apply every item, flushing progress every N items
//!     5. Finalize (completed / failed) and persist
//! }
//! ```
//!
//! Cancellation is only observed between dequeues; a job that was picked up
//! always runs to the end.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::repository::JobRepository;
use crate::services::parcel::ParcelService;
use crate::services::queue::{QueueTransport, BULK_APPLICATIONS_QUEUE};
use crate::types::{ApplicationItem, JobError, JobPayload, JobRecord, QueueMessage};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Wait after a failed dequeue
    pub poll_interval: Duration,
    /// Progress is persisted every this many items (and on the last one)
    pub progress_batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            progress_batch_size: 100,
        }
    }
}

pub struct BulkJobWorker {
    jobs: Arc<dyn JobRepository>,
    queue: Arc<dyn QueueTransport>,
    parcels: ParcelService,
    config: WorkerConfig,
}

impl BulkJobWorker {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        queue: Arc<dyn QueueTransport>,
        parcels: ParcelService,
        config: WorkerConfig,
    ) -> Self {
        Self {
            jobs,
            queue,
            parcels,
            config,
        }
    }

    /// Run until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        info!(queue = BULK_APPLICATIONS_QUEUE, "Bulk job worker started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.queue.dequeue(BULK_APPLICATIONS_QUEUE).await {
                Ok(Some(message)) => {
                    let span = info_span!("bulk_job", job_id = %message.id);
                    self.handle_message(message).instrument(span).await;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Failed to dequeue job");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
            }
        }

        info!("Bulk job worker stopped");
    }

    /// Process one dequeued message against the stored job
    pub async fn handle_message(&self, message: QueueMessage) {
        let job_id = message.id;

        let mut job = match self.jobs.get_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(%job_id, "Job not found, skipping message");
                return;
            }
            Err(e) => {
                error!(%job_id, error = %e, "Failed to load job, skipping message");
                return;
            }
        };

        if job.status.is_terminal() {
            warn!(%job_id, status = %job.status, "Job already finished, skipping message");
            return;
        }

        let payload = match JobPayload::decode(job.job_type, &job.payload) {
            Ok(payload) => payload,
            Err(e) => {
                error!(%job_id, error = %e, "Invalid job payload");
                let errors = vec![JobError::message(format!("invalid job payload: {}", e))];
                if job.fail(errors).is_ok() {
                    self.persist(&job).await;
                }
                return;
            }
        };

        match payload {
            JobPayload::BulkApplications(payload) => {
                self.process_applications(&mut job, &payload.applications).await
            }
        }
    }

    async fn process_applications(&self, job: &mut JobRecord, items: &[ApplicationItem]) {
        let total = items.len();
        if let Err(e) = job.start(total as u32) {
            warn!(job_id = %job.id, error = %e, "Cannot start job, skipping");
            return;
        }
        self.persist(job).await;
        info!(job_id = %job.id, total, "Processing bulk applications");

        let batch_size = self.config.progress_batch_size.max(1);
        let mut succeeded = 0u32;
        let mut errors = Vec::new();

        for (index, item) in items.iter().enumerate() {
            match self.parcels.add_application(item).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    debug!(job_id = %job.id, line = index + 1, error = %e, "Item failed");
                    errors.push(JobError::item(index + 1, item.parcel_id.to_string(), e.to_string()));
                    job.record_error();
                }
            }

            let handled = index + 1;
            if handled % batch_size == 0 || handled == total {
                self.flush_progress(job, handled as u32).await;
            }
        }

        if let Err(e) = job.finalize(succeeded, errors) {
            error!(job_id = %job.id, error = %e, "Failed to finalize job");
            return;
        }
        self.persist(job).await;

        info!(
            job_id = %job.id,
            status = %job.status,
            succeeded,
            failed = job.error_count,
            "Bulk applications job finished"
        );
    }

    async fn flush_progress(&self, job: &mut JobRecord, handled: u32) {
        if let Err(e) = job.update_progress(handled) {
            warn!(job_id = %job.id, error = %e, "Progress update rejected");
            return;
        }
        if let Err(e) = self
            .jobs
            .update_progress(job.id, job.processed_items, job.progress_percent, job.error_count)
            .await
        {
            error!(job_id = %job.id, error = %e, "Failed to persist job progress");
        }
    }

    async fn persist(&self, job: &JobRecord) {
        if let Err(e) = self.jobs.update(job).await {
            error!(job_id = %job.id, status = %job.status, error = %e, "Failed to persist job");
        }
    }
}
