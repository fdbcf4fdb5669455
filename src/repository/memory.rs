//! In-memory store for tests

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{JobRepository, ParcelRepository, SurveyRepository};
use crate::error::RepositoryError;
use crate::types::{JobRecord, ParcelAggregate, PestMap, SurveyStatus, SurveyUpload};

#[derive(Default)]
pub struct InMemoryStore {
    parcels: Mutex<HashMap<Uuid, ParcelAggregate>>,
    jobs: Mutex<HashMap<Uuid, JobRecord>>,
    surveys: Mutex<HashMap<Uuid, SurveyUpload>>,
    /// Number of upcoming `update_pests` calls that report a conflict
    forced_conflicts: Mutex<u32>,
    /// `processed_items` of every `update_progress` call, in order
    progress_writes: Mutex<Vec<u32>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force_conflicts(&self, count: u32) {
        *self.forced_conflicts.lock() = count;
    }

    pub fn progress_writes(&self) -> Vec<u32> {
        self.progress_writes.lock().clone()
    }

    pub fn parcel_count(&self) -> usize {
        self.parcels.lock().len()
    }
}

#[async_trait]
impl ParcelRepository for InMemoryStore {
    async fn create_batch(&self, parcels: &[ParcelAggregate]) -> Result<(), RepositoryError> {
        let mut stored = self.parcels.lock();
        for parcel in parcels {
            stored.insert(parcel.id, parcel.clone());
        }
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ParcelAggregate>, RepositoryError> {
        Ok(self.parcels.lock().get(&id).cloned())
    }

    async fn update_pests(
        &self,
        id: Uuid,
        pests: &PestMap,
        expected_version: i64,
    ) -> Result<i64, RepositoryError> {
        {
            let mut forced = self.forced_conflicts.lock();
            if *forced > 0 {
                *forced -= 1;
                return Err(RepositoryError::Conflict(id));
            }
        }

        let mut stored = self.parcels.lock();
        let parcel = stored
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("parcel {}", id)))?;
        if parcel.version != expected_version {
            return Err(RepositoryError::Conflict(id));
        }

        parcel.pests = pests.clone();
        parcel.version += 1;
        parcel.updated_at = Utc::now();
        Ok(parcel.version)
    }
}

#[async_trait]
impl JobRepository for InMemoryStore {
    async fn create(&self, job: &JobRecord) -> Result<(), RepositoryError> {
        self.jobs.lock().insert(job.id, job.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<JobRecord>, RepositoryError> {
        Ok(self.jobs.lock().get(&id).cloned())
    }

    async fn update(&self, job: &JobRecord) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(&job.id) {
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("job {}", job.id))),
        }
    }

    async fn update_progress(
        &self,
        id: Uuid,
        processed_items: u32,
        progress_percent: u8,
        error_count: u32,
    ) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("job {}", id)))?;
        job.processed_items = processed_items;
        job.progress_percent = progress_percent;
        job.error_count = error_count;
        job.updated_at = Utc::now();
        self.progress_writes.lock().push(processed_items);
        Ok(())
    }
}

#[async_trait]
impl SurveyRepository for InMemoryStore {
    async fn create(&self, survey: &SurveyUpload) -> Result<(), RepositoryError> {
        self.surveys.lock().insert(survey.id, survey.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<SurveyUpload>, RepositoryError> {
        Ok(self.surveys.lock().get(&id).cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<SurveyUpload>, i64), RepositoryError> {
        let mut surveys: Vec<SurveyUpload> = self.surveys.lock().values().cloned().collect();
        surveys.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = surveys.len() as i64;
        let page = surveys
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: SurveyStatus,
        total_rows: u32,
    ) -> Result<(), RepositoryError> {
        let mut surveys = self.surveys.lock();
        let survey = surveys
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("survey {}", id)))?;
        survey.status = status;
        survey.total_rows = total_rows;
        survey.updated_at = Utc::now();
        Ok(())
    }
}
