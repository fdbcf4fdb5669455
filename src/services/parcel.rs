//! Single-item parcel mutations

use std::sync::Arc;

use tracing::debug;

use crate::error::{DomainError, RepositoryError, ServiceError};
use crate::repository::ParcelRepository;
use crate::types::ApplicationItem;

/// Read-modify-write attempts before a version conflict is reported
const MAX_UPDATE_ATTEMPTS: u32 = 3;

pub struct ParcelService {
    parcels: Arc<dyn ParcelRepository>,
}

impl ParcelService {
    pub fn new(parcels: Arc<dyn ParcelRepository>) -> Self {
        Self { parcels }
    }

    /// Upsert one herbicide application on a parcel's pest map.
    ///
    /// The pest must already be present on the parcel. Concurrent writers
    /// are detected through the parcel version; the whole read-modify-write
    /// is retried on conflict.
    pub async fn add_application(&self, item: &ApplicationItem) -> Result<(), ServiceError> {
        let mut attempt = 1;
        loop {
            let mut parcel = self
                .parcels
                .get_by_id(item.parcel_id)
                .await?
                .ok_or(DomainError::ParcelNotFound(item.parcel_id))?;

            parcel
                .pests
                .add_application(&item.pest, item.position, &item.herbicide, item.dose)?;

            match self
                .parcels
                .update_pests(parcel.id, &parcel.pests, parcel.version)
                .await
            {
                Ok(_) => return Ok(()),
                Err(RepositoryError::Conflict(id)) if attempt < MAX_UPDATE_ATTEMPTS => {
                    debug!("Version conflict on parcel {} (attempt {}), retrying", id, attempt);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
