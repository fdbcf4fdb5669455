//! Job queue types for async bulk processing
//!
//! A `JobRecord` is the persisted unit of work. It moves through
//! `pending -> processing -> completed | failed` and never leaves a
//! terminal state. The queued `QueueMessage` only carries a snapshot;
//! the worker always reloads the record from the store before acting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

// ==========================================================================
// Tests First (TDD)
// ==========================================================================


// ==========================================================================
// Implementation
// ==========================================================================

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// String stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("invalid job status: {}", s)),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of work a job carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    BulkApplications,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::BulkApplications => "bulk_applications",
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bulk_applications" => Ok(JobType::BulkApplications),
            _ => Err(format!("invalid job type: {}", s)),
        }
    }
}

/// One failed item (or a synthetic job-level error when `line` is absent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    /// 1-based item index in the payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub message: String,
}

impl JobError {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            line: None,
            item_id: None,
            message: message.into(),
        }
    }

    pub fn item(line: usize, item_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            item_id: Some(item_id.into()),
            message: message.into(),
        }
    }
}

/// One herbicide application to upsert on a parcel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationItem {
    pub parcel_id: Uuid,
    pub pest: String,
    pub position: i32,
    pub herbicide: String,
    pub dose: f64,
}

/// Payload of a bulk-applications job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkApplicationsPayload {
    pub applications: Vec<ApplicationItem>,
}

/// Strongly-typed job payload, decoded once per job from the stored JSON
#[derive(Debug, Clone, PartialEq)]
pub enum JobPayload {
    BulkApplications(BulkApplicationsPayload),
}

impl JobPayload {
    /// Decode the stored payload according to the job type
    pub fn decode(job_type: JobType, raw: &serde_json::Value) -> Result<Self, serde_json::Error> {
        match job_type {
            JobType::BulkApplications => Ok(JobPayload::BulkApplications(
                BulkApplicationsPayload::deserialize(raw)?,
            )),
        }
    }

    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::BulkApplications(_) => JobType::BulkApplications,
        }
    }

    pub fn item_count(&self) -> usize {
        match self {
            JobPayload::BulkApplications(p) => p.applications.len(),
        }
    }

    fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            JobPayload::BulkApplications(p) => serde_json::to_value(p),
        }
    }
}

/// Summary attached to a completed bulk-applications job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkApplicationsResult {
    pub processed: u32,
    pub errors: u32,
    #[serde(default)]
    pub error_details: Vec<JobError>,
}

/// Outcome stored on a completed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobResult {
    BulkApplications(BulkApplicationsResult),
}

/// Persisted unit of asynchronous work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Raw request; decoded with `JobPayload::decode`
    pub payload: serde_json::Value,
    pub result: Option<JobResult>,
    pub progress_percent: u8,
    pub total_items: u32,
    pub processed_items: u32,
    pub error_count: u32,
    #[serde(default)]
    pub error_details: Vec<JobError>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// New pending job. `total_items` stays 0 until `start`.
    pub fn new(id: Uuid, payload: &JobPayload) -> Result<Self, serde_json::Error> {
        let now = Utc::now();
        Ok(Self {
            id,
            job_type: payload.job_type(),
            status: JobStatus::Pending,
            payload: payload.to_value()?,
            result: None,
            progress_percent: 0,
            total_items: 0,
            processed_items: 0,
            error_count: 0,
            error_details: Vec::new(),
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn transition_error(&self, to: JobStatus) -> DomainError {
        DomainError::InvalidTransition {
            from: self.status,
            to,
        }
    }

    /// Enter `processing`. Only legal before any progress has been recorded.
    pub fn start(&mut self, total_items: u32) -> Result<(), DomainError> {
        let allowed = match self.status {
            JobStatus::Pending => true,
            JobStatus::Processing => self.processed_items == 0,
            JobStatus::Completed | JobStatus::Failed => false,
        };
        if !allowed {
            return Err(self.transition_error(JobStatus::Processing));
        }

        let now = Utc::now();
        self.status = JobStatus::Processing;
        self.total_items = total_items;
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Record how many items have been handled so far (successes + failures)
    pub fn update_progress(&mut self, processed: u32) -> Result<(), DomainError> {
        if self.status != JobStatus::Processing {
            return Err(self.transition_error(JobStatus::Processing));
        }

        self.processed_items = processed.min(self.total_items).max(self.processed_items);
        self.progress_percent = progress_percent(self.processed_items, self.total_items);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn record_error(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.error_count += 1;
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self, result: JobResult, errors: Vec<JobError>) -> Result<(), DomainError> {
        if self.status != JobStatus::Processing {
            return Err(self.transition_error(JobStatus::Completed));
        }

        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.completed_at = Some(now);
        self.progress_percent = 100;
        self.result = Some(result);
        self.error_count = errors.len() as u32;
        self.error_details = errors;
        self.updated_at = now;
        Ok(())
    }

    pub fn fail(&mut self, errors: Vec<JobError>) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(self.transition_error(JobStatus::Failed));
        }

        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.completed_at = Some(now);
        self.error_count = errors.len() as u32;
        self.error_details = errors;
        self.updated_at = now;
        Ok(())
    }

    /// Close the job: failed when nothing succeeded and something failed,
    /// completed (with the error list in the summary) otherwise.
    pub fn finalize(&mut self, succeeded: u32, errors: Vec<JobError>) -> Result<(), DomainError> {
        if succeeded == 0 && !errors.is_empty() {
            return self.fail(errors);
        }

        let result = JobResult::BulkApplications(BulkApplicationsResult {
            processed: succeeded,
            errors: errors.len() as u32,
            error_details: errors.clone(),
        });
        self.complete(result, errors)
    }
}

fn progress_percent(processed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    ((processed as u64 * 100) / total as u64).min(100) as u8
}

/// Message carried by the queue transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    pub id: Uuid,
    pub queue_name: String,
    /// Snapshot at enqueue time; the store stays authoritative
    pub job: JobRecord,
}

impl QueueMessage {
    pub fn new(job: &JobRecord, queue_name: &str) -> Self {
        Self {
            id: job.id,
            queue_name: queue_name.to_string(),
            job: job.clone(),
        }
    }
}

/// Response when a job is submitted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmitResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
}

/// Request for the status of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusRequest {
    pub job_id: Uuid,
}

/// Job status as seen by polling callers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: u8,
    pub total_items: u32,
    pub processed_items: u32,
    pub error_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<JobError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&JobRecord> for JobStatusResponse {
    fn from(job: &JobRecord) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type,
            status: job.status,
            progress: job.progress_percent,
            total_items: job.total_items,
            processed_items: job.processed_items,
            error_count: job.error_count,
            errors: job.error_details.clone(),
            result: job.result.clone(),
            started_at: job.started_at,
            completed_at: job.completed_at,
            created_at: job.created_at,
        }
    }
}
