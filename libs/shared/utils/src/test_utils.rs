use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::{AppConfig, LedgerBackend};
use shared_models::{
    today, DoctorSnapshot, NewAppointment, PatientInfo, Period, ScheduleKey,
};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub lock_timeout_ms: u64,
    pub max_busy_retries: u32,
    pub retry_backoff_ms: u64,
    pub booking_webhook_url: Option<String>,
    pub admin_api_key: Option<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            lock_timeout_ms: 2000,
            max_busy_retries: 2,
            retry_backoff_ms: 5,
            booking_webhook_url: None,
            admin_api_key: None,
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: impl Into<String>) -> Self {
        Self {
            supabase_url: url.into(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            server_port: 0,
            ledger_backend: LedgerBackend::Memory,
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_key: String::new(),
            lock_timeout_ms: self.lock_timeout_ms,
            max_busy_retries: self.max_busy_retries,
            retry_backoff_ms: self.retry_backoff_ms,
            booking_webhook_url: self.booking_webhook_url.clone(),
            booking_webhook_mention_all: true,
            admin_api_key: self.admin_api_key.clone(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestFixtures;

impl TestFixtures {
    pub const DOCTOR_ID: &'static str = "doc-1001";

    /// A date `days` after today, so default listings include it.
    pub fn date_in(days: i64) -> NaiveDate {
        today() + Duration::days(days)
    }

    pub fn slot(doctor_id: &str, days_ahead: i64, period: Period) -> ScheduleKey {
        ScheduleKey::new(doctor_id, Self::date_in(days_ahead), period)
    }

    pub fn patient(name: &str, phone: &str) -> PatientInfo {
        PatientInfo {
            patient_name: name.to_string(),
            patient_gender: Some("female".to_string()),
            patient_age: Some(34),
            patient_phone: phone.to_string(),
            symptoms: Some("persistent cough".to_string()),
        }
    }

    pub fn doctor() -> DoctorSnapshot {
        DoctorSnapshot {
            doctor_name: Some("Dr. Chen Wei".to_string()),
            hospital_name: Some("Riverside General Hospital".to_string()),
            department_name: Some("Respiratory Medicine".to_string()),
        }
    }

    pub fn booking(key: &ScheduleKey, phone: &str) -> NewAppointment {
        NewAppointment::new(
            key.clone(),
            Self::doctor(),
            Self::patient("Li Na", phone),
            Some(10.0),
        )
    }

    /// JSON body accepted by `POST /appointments`.
    pub fn booking_body(key: &ScheduleKey, phone: &str) -> Value {
        json!({
            "doctorId": key.doctor_id,
            "doctorName": "Dr. Chen Wei",
            "hospitalName": "Riverside General Hospital",
            "departmentName": "Respiratory Medicine",
            "scheduleDate": key.schedule_date.to_string(),
            "period": key.period,
            "patientName": "Li Na",
            "patientGender": "female",
            "patientAge": 34,
            "patientPhone": phone,
            "symptoms": "persistent cough",
            "registrationFee": 10.0
        })
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn schedule_row(key: &ScheduleKey, total_slots: i32, remaining_slots: i32) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "doctor_id": key.doctor_id,
            "schedule_date": key.schedule_date.to_string(),
            "period": key.period,
            "total_slots": total_slots,
            "remaining_slots": remaining_slots,
            "updated_at": Utc::now().to_rfc3339()
        })
    }

    pub fn appointment_row(id: Uuid, key: &ScheduleKey, phone: &str, status: &str) -> Value {
        json!({
            "id": id,
            "doctor_id": key.doctor_id,
            "doctor_name": "Dr. Chen Wei",
            "hospital_name": "Riverside General Hospital",
            "department_name": "Respiratory Medicine",
            "schedule_date": key.schedule_date.to_string(),
            "period": key.period,
            "patient_name": "Li Na",
            "patient_gender": "female",
            "patient_age": 34,
            "patient_phone": phone,
            "symptoms": "persistent cough",
            "registration_fee": 10.0,
            "status": status,
            "created_at": Utc::now().to_rfc3339()
        })
    }

    pub fn postgrest_error(code: &str, message: &str) -> Value {
        json!({
            "code": code,
            "message": message,
            "details": null,
            "hint": null
        })
    }
}
