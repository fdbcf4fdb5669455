//! NATS message handlers

pub mod jobs;
pub mod ping;
pub mod survey;

use std::sync::Arc;

use anyhow::Result;
use async_nats::Client;
use tokio::select;
use tracing::{error, info};

use crate::services::ingestion::SurveyIngestionService;
use crate::services::job_service::JobService;

pub const SUBJECT_PING: &str = "agro.ping";
pub const SUBJECT_SURVEY_UPLOAD: &str = "agro.survey.upload";
pub const SUBJECT_SURVEY_GET: &str = "agro.survey.get";
pub const SUBJECT_SURVEY_LIST: &str = "agro.survey.list";
pub const SUBJECT_BULK_APPLICATIONS_SUBMIT: &str = "agro.jobs.bulk_applications.submit";
pub const SUBJECT_JOB_STATUS: &str = "agro.jobs.status";

/// Start all message handlers. Returns when any of them stops.
pub async fn start_handlers(
    client: Client,
    ingestion: Arc<SurveyIngestionService>,
    job_service: Arc<JobService>,
) -> Result<()> {
    info!("Starting message handlers...");

    let ping_sub = client.subscribe(SUBJECT_PING).await?;
    let survey_upload_sub = client.subscribe(SUBJECT_SURVEY_UPLOAD).await?;
    let survey_get_sub = client.subscribe(SUBJECT_SURVEY_GET).await?;
    let survey_list_sub = client.subscribe(SUBJECT_SURVEY_LIST).await?;
    let bulk_submit_sub = client.subscribe(SUBJECT_BULK_APPLICATIONS_SUBMIT).await?;
    let job_status_sub = client.subscribe(SUBJECT_JOB_STATUS).await?;

    info!(
        "Subscribed to {}, {}, {}, {}, {}, {}",
        SUBJECT_PING,
        SUBJECT_SURVEY_UPLOAD,
        SUBJECT_SURVEY_GET,
        SUBJECT_SURVEY_LIST,
        SUBJECT_BULK_APPLICATIONS_SUBMIT,
        SUBJECT_JOB_STATUS
    );

    let client_ping = client.clone();
    let client_survey = client.clone();
    let client_survey_get = client.clone();
    let client_survey_list = client.clone();
    let client_submit = client.clone();
    let client_status = client.clone();
    let surveys_get = Arc::clone(&ingestion);
    let surveys_list = Arc::clone(&ingestion);
    let jobs_submit = Arc::clone(&job_service);
    let jobs_status = Arc::clone(&job_service);

    let ping_handle = tokio::spawn(async move {
        ping::handle_ping(client_ping, ping_sub).await
    });

    let survey_upload_handle = tokio::spawn(async move {
        survey::handle_survey_upload(client_survey, survey_upload_sub, ingestion).await
    });

    let survey_get_handle = tokio::spawn(async move {
        survey::handle_survey_get(client_survey_get, survey_get_sub, surveys_get).await
    });

    let survey_list_handle = tokio::spawn(async move {
        survey::handle_survey_list(client_survey_list, survey_list_sub, surveys_list).await
    });

    let bulk_submit_handle = tokio::spawn(async move {
        jobs::handle_bulk_applications_submit(client_submit, bulk_submit_sub, jobs_submit).await
    });

    let job_status_handle = tokio::spawn(async move {
        jobs::handle_job_status(client_status, job_status_sub, jobs_status).await
    });

    info!("All handlers started");

    select! {
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = survey_upload_handle => {
            error!("Survey upload handler finished: {:?}", result);
        }
        result = survey_get_handle => {
            error!("Survey get handler finished: {:?}", result);
        }
        result = survey_list_handle => {
            error!("Survey list handler finished: {:?}", result);
        }
        result = bulk_submit_handle => {
            error!("Bulk applications submit handler finished: {:?}", result);
        }
        result = job_status_handle => {
            error!("Job status handler finished: {:?}", result);
        }
    }

    Ok(())
}
