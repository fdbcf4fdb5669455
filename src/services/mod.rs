//! Business logic services

pub mod bulk_job_worker;
pub mod csv_parser;
pub mod ids;
pub mod ingestion;
pub mod job_service;
pub mod parcel;
pub mod queue;
