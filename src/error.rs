//! Error types shared across the worker
//!
//! Typed errors live here so callers can tell a domain rejection
//! (e.g. a pest that was never marked present) apart from a store or
//! transport failure. Plumbing code (startup, config, queue transport)
//! uses `anyhow` instead.

use uuid::Uuid;

use crate::types::JobStatus;

/// Domain rule violations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("pest not found: {0}")]
    PestNotFound(String),
    #[error("parcel not found: {0}")]
    ParcelNotFound(Uuid),
    #[error("job not found: {0}")]
    JobNotFound(Uuid),
    #[error("survey not found: {0}")]
    SurveyNotFound(Uuid),
    #[error("invalid job transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

/// Fatal CSV ingestion errors (row-level problems never surface here)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CsvError {
    #[error("invalid CSV format: {0}")]
    InvalidFormat(String),
    #[error("invalid CSV: {0}")]
    InvalidCsv(String),
}

impl CsvError {
    /// Error code sent back to NATS callers
    pub fn code(&self) -> &'static str {
        match self {
            CsvError::InvalidFormat(_) => "INVALID_FORMAT",
            CsvError::InvalidCsv(_) => "INVALID_CSV",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("query failed: {0}")]
    QueryFailed(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("version conflict on {0}")]
    Conflict(Uuid),
    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(e.to_string()),
            other => RepositoryError::QueryFailed(other.to_string()),
        }
    }
}

/// Failure of a single use-case operation (one CSV upload, one applied item)
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Csv(#[from] CsvError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ServiceError {
    /// Error code sent back to NATS callers
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Csv(e) => e.code(),
            ServiceError::Domain(DomainError::PestNotFound(_)) => "PEST_NOT_FOUND",
            ServiceError::Domain(DomainError::ParcelNotFound(_)) => "PARCEL_NOT_FOUND",
            ServiceError::Domain(DomainError::JobNotFound(_)) => "JOB_NOT_FOUND",
            ServiceError::Domain(DomainError::SurveyNotFound(_)) => "SURVEY_NOT_FOUND",
            ServiceError::Domain(DomainError::InvalidTransition { .. }) => "INVALID_TRANSITION",
            ServiceError::Repository(_) => "DATABASE_ERROR",
        }
    }
}
