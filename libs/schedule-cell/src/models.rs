use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::{Period, ScheduleEntry, ScheduleKey, ScheduleQuery};

/// Longest date list a single batch or merged view may materialise.
pub const MAX_SCHEDULE_DAYS: i64 = 366;

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedScheduleRequest {
    pub doctor_id: Option<String>,
    #[serde(alias = "date")]
    pub schedule_date: Option<NaiveDate>,
    pub period: Option<Period>,
    pub total_slots: Option<i32>,
}

impl SeedScheduleRequest {
    pub fn into_key(self) -> Result<(ScheduleKey, i32), ScheduleError> {
        match (self.doctor_id, self.schedule_date, self.period, self.total_slots) {
            (Some(doctor_id), Some(date), Some(period), Some(total_slots))
                if !doctor_id.trim().is_empty() =>
            {
                Ok((ScheduleKey::new(doctor_id, date, period), total_slots))
            }
            _ => Err(ScheduleError::ValidationError("Missing required fields".to_string())),
        }
    }
}

/// Seeds a run of days: either `startDate..=endDate` or `days` days from today.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSeedRequest {
    pub doctor_id: Option<String>,
    pub days: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub morning_slots: Option<i32>,
    pub afternoon_slots: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScheduleRequest {
    pub total_slots: Option<i32>,
    pub morning_slots: Option<i32>,
    pub afternoon_slots: Option<i32>,
}

impl UpdateScheduleRequest {
    /// `totalSlots` wins; the per-period fields are accepted from older admin clients.
    pub fn slots(&self) -> Option<i32> {
        self.total_slots.or(self.morning_slots).or(self.afternoon_slots)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleListParams {
    pub doctor_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ScheduleListParams {
    pub fn to_query(&self) -> ScheduleQuery {
        ScheduleQuery {
            doctor_id: self.doctor_id.clone().filter(|id| !id.trim().is_empty()),
            date_from: self.start_date,
            date_to: self.end_date,
        }
    }

    /// Range for the merged per-day view, present only when doctor and both bounds are given.
    pub fn merge_range(&self) -> Option<(&str, NaiveDate, NaiveDate)> {
        match (self.doctor_id.as_deref(), self.start_date, self.end_date) {
            (Some(doctor_id), Some(start), Some(end)) if !doctor_id.trim().is_empty() => {
                Some((doctor_id, start, end))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorScheduleParams {
    pub start_date: Option<NaiveDate>,
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

/// One calendar day of a doctor's capacity, both periods side by side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedDaySchedule {
    pub date: NaiveDate,
    pub doctor_id: String,
    pub morning_slots: i32,
    pub afternoon_slots: i32,
    pub morning_id: Option<Uuid>,
    pub afternoon_id: Option<Uuid>,
}

impl MergedDaySchedule {
    pub fn empty(doctor_id: &str, date: NaiveDate) -> Self {
        Self {
            date,
            doctor_id: doctor_id.to_string(),
            morning_slots: 0,
            afternoon_slots: 0,
            morning_id: None,
            afternoon_id: None,
        }
    }

    pub fn apply(&mut self, entry: &ScheduleEntry) {
        match entry.period {
            Period::Morning => {
                self.morning_slots = entry.total_slots;
                self.morning_id = Some(entry.id);
            }
            Period::Afternoon => {
                self.afternoon_slots = entry.total_slots;
                self.afternoon_id = Some(entry.id);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AdminScheduleView {
    Merged(Vec<MergedDaySchedule>),
    Entries(Vec<ScheduleEntry>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSeedOutcome {
    pub count: usize,
    pub entries: Vec<ScheduleEntry>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("{0}")]
    ValidationError(String),

    #[error("Schedule not found: {0}")]
    NotFound(String),

    #[error("Schedule is busy, retry later: {0}")]
    Busy(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<StoreError> for ScheduleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => ScheduleError::ValidationError(msg),
            StoreError::NotFound(msg) => ScheduleError::NotFound(msg),
            StoreError::Busy(msg) => ScheduleError::Busy(msg),
            other => ScheduleError::StorageError(other.to_string()),
        }
    }
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::ValidationError(msg) => AppError::ValidationError(msg),
            ScheduleError::NotFound(_) => AppError::NotFound("Schedule not found".to_string()),
            ScheduleError::Busy(msg) => {
                AppError::ServiceUnavailable(format!("Schedule is busy, retry later: {}", msg))
            }
            ScheduleError::StorageError(msg) => AppError::Database(msg),
        }
    }
}
