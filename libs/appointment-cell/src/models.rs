use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::{
    AppointmentFilter, AppointmentStatus, DoctorSnapshot, NewAppointment, PatientInfo, Period,
    ScheduleKey,
};

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Body of `POST /appointments`. Every field is optional on the wire so that missing input is
/// reported as a validation error naming the fields, not a decode failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAppointmentRequest {
    pub doctor_id: Option<String>,
    pub doctor_name: Option<String>,
    pub hospital_name: Option<String>,
    pub department_name: Option<String>,
    pub schedule_date: Option<NaiveDate>,
    pub period: Option<Period>,
    pub patient_name: Option<String>,
    pub patient_gender: Option<String>,
    pub patient_age: Option<u32>,
    pub patient_phone: Option<String>,
    pub symptoms: Option<String>,
    pub registration_fee: Option<f64>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl BookAppointmentRequest {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if present(&self.doctor_id).is_none() {
            missing.push("doctorId");
        }
        if self.schedule_date.is_none() {
            missing.push("scheduleDate");
        }
        if self.period.is_none() {
            missing.push("period");
        }
        if present(&self.patient_name).is_none() {
            missing.push("patientName");
        }
        if present(&self.patient_phone).is_none() {
            missing.push("patientPhone");
        }
        missing
    }

    /// Builds the booking with a fresh id, snapshotting the doctor fields as sent.
    pub fn into_new_appointment(self) -> Result<NewAppointment, LedgerError> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(LedgerError::ValidationError(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let (Some(doctor_id), Some(schedule_date), Some(period), Some(patient_name), Some(patient_phone)) = (
            self.doctor_id,
            self.schedule_date,
            self.period,
            self.patient_name,
            self.patient_phone,
        ) else {
            return Err(LedgerError::ValidationError("Missing required fields".to_string()));
        };

        Ok(NewAppointment::new(
            ScheduleKey::new(doctor_id.trim(), schedule_date, period),
            DoctorSnapshot {
                doctor_name: self.doctor_name,
                hospital_name: self.hospital_name,
                department_name: self.department_name,
            },
            PatientInfo {
                patient_name: patient_name.trim().to_string(),
                patient_gender: self.patient_gender,
                patient_age: self.patient_age,
                patient_phone: patient_phone.trim().to_string(),
                symptoms: self.symptoms,
            },
            self.registration_fee,
        ))
    }
}

/// Query string of `GET /appointments`; empty parameters are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentListParams {
    pub phone: Option<String>,
    pub doctor_id: Option<String>,
    pub status: Option<String>,
}

impl AppointmentListParams {
    pub fn to_filter(&self) -> Result<AppointmentFilter, LedgerError> {
        let status = match present(&self.status) {
            Some(status) => Some(
                status
                    .parse::<AppointmentStatus>()
                    .map_err(LedgerError::ValidationError)?,
            ),
            None => None,
        };
        Ok(AppointmentFilter {
            phone: present(&self.phone).map(str::to_string),
            doctor_id: present(&self.doctor_id).map(str::to_string),
            status,
        })
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    ValidationError(String),

    #[error("This time slot has not been opened for booking")]
    NoSchedule,

    #[error("This time slot is full")]
    SlotsExhausted,

    #[error("Appointment not found: {0}")]
    NotFound(String),

    #[error("Appointment {0} is already cancelled")]
    AlreadyCancelled(Uuid),

    #[error("Ledger is busy, retry later: {0}")]
    Busy(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Busy(_))
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => LedgerError::ValidationError(msg),
            StoreError::NotFound(msg) => LedgerError::NotFound(msg),
            StoreError::NoSchedule(_) => LedgerError::NoSchedule,
            StoreError::SlotsExhausted(_) => LedgerError::SlotsExhausted,
            StoreError::AlreadyCancelled(id) => LedgerError::AlreadyCancelled(id),
            StoreError::Busy(msg) => LedgerError::Busy(msg),
            StoreError::Storage(msg) => LedgerError::StorageError(msg),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::ValidationError(msg) => AppError::ValidationError(msg),
            LedgerError::NoSchedule | LedgerError::SlotsExhausted | LedgerError::AlreadyCancelled(_) => {
                AppError::BadRequest(err.to_string())
            }
            LedgerError::NotFound(_) => AppError::NotFound("Appointment not found".to_string()),
            LedgerError::Busy(_) => AppError::ServiceUnavailable(err.to_string()),
            LedgerError::StorageError(msg) => AppError::Database(msg),
        }
    }
}
