use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schedule::{Period, ScheduleKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "pending" => Ok(AppointmentStatus::Pending),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(format!("invalid appointment status: {}", other)),
        }
    }
}

/// Doctor and hospital display fields copied in at booking time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorSnapshot {
    pub doctor_name: Option<String>,
    pub hospital_name: Option<String>,
    pub department_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientInfo {
    pub patient_name: String,
    pub patient_gender: Option<String>,
    pub patient_age: Option<u32>,
    pub patient_phone: String,
    pub symptoms: Option<String>,
}

/// A booking about to be recorded; always stored as pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointment {
    pub id: Uuid,
    pub doctor_id: String,
    pub schedule_date: NaiveDate,
    pub period: Period,
    #[serde(flatten)]
    pub doctor: DoctorSnapshot,
    #[serde(flatten)]
    pub patient: PatientInfo,
    pub registration_fee: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl NewAppointment {
    pub fn new(key: ScheduleKey, doctor: DoctorSnapshot, patient: PatientInfo, registration_fee: Option<f64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id: key.doctor_id,
            schedule_date: key.schedule_date,
            period: key.period,
            doctor,
            patient,
            registration_fee,
            created_at: Utc::now(),
        }
    }

    pub fn schedule_key(&self) -> ScheduleKey {
        ScheduleKey::new(self.doctor_id.clone(), self.schedule_date, self.period)
    }

    /// Names of required text fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.doctor_id.trim().is_empty() {
            missing.push("doctorId");
        }
        if self.patient.patient_name.trim().is_empty() {
            missing.push("patientName");
        }
        if self.patient.patient_phone.trim().is_empty() {
            missing.push("patientPhone");
        }
        missing
    }

    pub fn into_pending(self) -> Appointment {
        Appointment {
            id: self.id,
            doctor_id: self.doctor_id,
            doctor: self.doctor,
            schedule_date: self.schedule_date,
            period: self.period,
            patient: self.patient,
            registration_fee: self.registration_fee,
            status: AppointmentStatus::Pending,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: String,
    #[serde(flatten)]
    pub doctor: DoctorSnapshot,
    pub schedule_date: NaiveDate,
    pub period: Period,
    #[serde(flatten)]
    pub patient: PatientInfo,
    pub registration_fee: Option<f64>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn schedule_key(&self) -> ScheduleKey {
        ScheduleKey::new(self.doctor_id.clone(), self.schedule_date, self.period)
    }

    pub fn is_pending(&self) -> bool {
        self.status == AppointmentStatus::Pending
    }
}

/// Newest first, ties broken by id so listings are stable.
pub fn sort_newest_first(appointments: &mut [Appointment]) {
    appointments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentFilter {
    pub phone: Option<String>,
    pub doctor_id: Option<String>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.phone
            .as_ref()
            .map_or(true, |phone| &appointment.patient.patient_phone == phone)
            && self
                .doctor_id
                .as_ref()
                .map_or(true, |doctor_id| &appointment.doctor_id == doctor_id)
            && self.status.map_or(true, |status| appointment.status == status)
    }
}

/// Result of a committed cancellation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcome {
    pub appointment: Appointment,
    /// False when the schedule entry was gone or already at full capacity.
    pub capacity_restored: bool,
}
