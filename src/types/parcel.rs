//! Parcel (monitored land unit) types and the pest/application map

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Infestation level codes used by some survey spreadsheets (A/M/B)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InfestationLevel {
    High,
    Medium,
    Low,
}

impl InfestationLevel {
    /// Parse a spreadsheet level code (already trimmed and upper-cased)
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(Self::High),
            "M" => Some(Self::Medium),
            "B" => Some(Self::Low),
            _ => None,
        }
    }
}

/// One herbicide application slot for a pest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HerbicideApplication {
    /// Logical slot; at most one application per position
    pub position: i32,
    pub herbicide: String,
    pub dose: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
}

/// Presence flag plus the position-keyed applications for one pest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PestEntry {
    pub present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<InfestationLevel>,
    #[serde(default)]
    pub applications: Vec<HerbicideApplication>,
}

/// Pest name -> entry. Stored as JSONB (`{"pests": {...}}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PestMap {
    #[serde(default)]
    pub pests: HashMap<String, PestEntry>,
}

impl PestMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a pest as present with an empty application list.
    /// Calling it again resets the entry.
    pub fn add_pest(&mut self, name: &str) {
        self.pests.insert(
            name.to_string(),
            PestEntry {
                present: true,
                level: None,
                applications: Vec::new(),
            },
        );
    }

    /// Same as `add_pest`, recording the infestation level
    pub fn add_pest_with_level(&mut self, name: &str, level: InfestationLevel) {
        self.pests.insert(
            name.to_string(),
            PestEntry {
                present: true,
                level: Some(level),
                applications: Vec::new(),
            },
        );
    }

    /// Insert or update the application at `position` for a present pest.
    ///
    /// Returns `DomainError::PestNotFound` without touching the map when the
    /// pest was never marked present.
    pub fn add_application(
        &mut self,
        pest: &str,
        position: i32,
        herbicide: &str,
        dose: f64,
    ) -> Result<(), DomainError> {
        let entry = match self.pests.get_mut(pest) {
            Some(entry) if entry.present => entry,
            _ => return Err(DomainError::PestNotFound(pest.to_string())),
        };

        let now = Utc::now();
        match entry.applications.iter_mut().find(|a| a.position == position) {
            Some(existing) => {
                existing.herbicide = herbicide.to_string();
                existing.dose = dose;
                existing.applied_at = Some(now);
            }
            None => entry.applications.push(HerbicideApplication {
                position,
                herbicide: herbicide.to_string(),
                dose,
                applied_at: Some(now),
            }),
        }

        Ok(())
    }

    pub fn has_pest(&self, name: &str) -> bool {
        self.pests.get(name).map_or(false, |e| e.present)
    }

    pub fn get(&self, name: &str) -> Option<&PestEntry> {
        self.pests.get(name)
    }

    /// Names of present pests, sorted for stable output
    pub fn present_pests(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .pests
            .keys()
            .filter(|name| self.has_pest(name))
            .cloned()
            .collect();
        names.sort();
        names
    }
}

/// Fixed survey columns of one spreadsheet row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyFields {
    /// Value of the spreadsheet's own `Id` column
    pub external_id: String,
    pub sector: String,
    pub sector2: String,
    pub farm_code: String,
    pub farm_description: String,
    pub block: String,
    pub cut: i32,
    pub total_area: f64,
    pub soil_texture: String,
    pub current_cut: i32,
    pub renewal: String,
    pub harvest_month: String,
    pub restriction: String,
}

/// Normalized record for one monitored parcel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelAggregate {
    pub id: Uuid,
    /// Upload this parcel was ingested from
    pub survey_id: Uuid,
    #[serde(flatten)]
    pub fields: SurveyFields,
    pub pests: PestMap,
    /// Optimistic concurrency token, bumped on every pest update
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ParcelAggregate {
    pub fn new(id: Uuid, survey_id: Uuid, fields: SurveyFields) -> Self {
        let now = Utc::now();
        Self {
            id,
            survey_id,
            fields,
            pests: PestMap::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
