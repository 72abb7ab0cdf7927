//! PostgREST-backed ledger store.
//!
//! Table reads and admin writes go straight to `doctor_schedules` / `appointments`. `book` and
//! `cancel` call the `book_slot` and `cancel_appointment` functions from
//! `migrations/0001_slot_ledger.sql`; each runs in the single transaction PostgREST opens per
//! request and takes `FOR UPDATE` row locks bounded by `lock_timeout`.
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{
    sort_entries, sort_newest_first, today, Appointment, AppointmentFilter, AppointmentStatus,
    CancelOutcome, DoctorSnapshot, NewAppointment, PatientInfo, Period, ScheduleEntry, ScheduleKey,
    ScheduleQuery,
};

use super::{
    plan_batch, validate_new_appointment, validate_total_slots, AppointmentStore, LedgerStore,
    ScheduleStore, StoreError, StoreResult,
};
use crate::supabase::{SupabaseClient, SupabaseError};

const SCHEDULES: &str = "/rest/v1/doctor_schedules";
const APPOINTMENTS: &str = "/rest/v1/appointments";
const RETURN_REPRESENTATION: &str = "return=representation";
const UPSERT_PREFER: &str = "resolution=merge-duplicates,return=representation";

/// SQLSTATEs raised by the ledger functions.
const NO_SCHEDULE: &str = "LS001";
const SLOTS_EXHAUSTED: &str = "LS002";
const APPOINTMENT_NOT_FOUND: &str = "LS003";
const ALREADY_CANCELLED: &str = "LS004";
const LOCK_NOT_AVAILABLE: &str = "55P03";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const CHECK_VIOLATION: &str = "23514";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScheduleRow {
    id: Uuid,
    doctor_id: String,
    schedule_date: NaiveDate,
    period: Period,
    total_slots: i32,
    remaining_slots: i32,
    updated_at: DateTime<Utc>,
}

impl From<ScheduleRow> for ScheduleEntry {
    fn from(row: ScheduleRow) -> Self {
        ScheduleEntry {
            id: row.id,
            doctor_id: row.doctor_id,
            schedule_date: row.schedule_date,
            period: row.period,
            total_slots: row.total_slots,
            remaining_slots: row.remaining_slots,
            updated_at: row.updated_at,
        }
    }
}

/// Upsert payload; the id is left to the column default so re-seeding keeps an entry's id.
#[derive(Debug, Serialize)]
struct ScheduleSeedRow<'a> {
    doctor_id: &'a str,
    schedule_date: NaiveDate,
    period: Period,
    total_slots: i32,
    remaining_slots: i32,
    updated_at: DateTime<Utc>,
}

impl<'a> ScheduleSeedRow<'a> {
    fn new(key: &'a ScheduleKey, total_slots: i32) -> Self {
        Self {
            doctor_id: &key.doctor_id,
            schedule_date: key.schedule_date,
            period: key.period,
            total_slots,
            remaining_slots: total_slots,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AppointmentRow {
    id: Uuid,
    doctor_id: String,
    doctor_name: Option<String>,
    hospital_name: Option<String>,
    department_name: Option<String>,
    schedule_date: NaiveDate,
    period: Period,
    patient_name: String,
    patient_gender: Option<String>,
    patient_age: Option<u32>,
    patient_phone: String,
    symptoms: Option<String>,
    registration_fee: Option<f64>,
    status: AppointmentStatus,
    created_at: DateTime<Utc>,
}

impl From<Appointment> for AppointmentRow {
    fn from(appointment: Appointment) -> Self {
        Self {
            id: appointment.id,
            doctor_id: appointment.doctor_id,
            doctor_name: appointment.doctor.doctor_name,
            hospital_name: appointment.doctor.hospital_name,
            department_name: appointment.doctor.department_name,
            schedule_date: appointment.schedule_date,
            period: appointment.period,
            patient_name: appointment.patient.patient_name,
            patient_gender: appointment.patient.patient_gender,
            patient_age: appointment.patient.patient_age,
            patient_phone: appointment.patient.patient_phone,
            symptoms: appointment.patient.symptoms,
            registration_fee: appointment.registration_fee,
            status: appointment.status,
            created_at: appointment.created_at,
        }
    }
}

impl From<AppointmentRow> for Appointment {
    fn from(row: AppointmentRow) -> Self {
        Appointment {
            id: row.id,
            doctor_id: row.doctor_id,
            doctor: DoctorSnapshot {
                doctor_name: row.doctor_name,
                hospital_name: row.hospital_name,
                department_name: row.department_name,
            },
            schedule_date: row.schedule_date,
            period: row.period,
            patient: PatientInfo {
                patient_name: row.patient_name,
                patient_gender: row.patient_gender,
                patient_age: row.patient_age,
                patient_phone: row.patient_phone,
                symptoms: row.symptoms,
            },
            registration_fee: row.registration_fee,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CancelResult {
    appointment: AppointmentRow,
    capacity_restored: bool,
}

/// Maps PostgREST failures onto the ledger taxonomy.
fn map_error(err: SupabaseError) -> StoreError {
    let message = match &err {
        SupabaseError::Api { message, .. } => message.clone(),
        other => other.to_string(),
    };

    match err.sql_state() {
        Some(NO_SCHEDULE) => StoreError::NoSchedule(message),
        Some(SLOTS_EXHAUSTED) => StoreError::SlotsExhausted(message),
        Some(APPOINTMENT_NOT_FOUND) => StoreError::NotFound(message),
        Some(ALREADY_CANCELLED) => match extract_uuid(&message) {
            Some(id) => StoreError::AlreadyCancelled(id),
            None => StoreError::Storage(message),
        },
        Some(LOCK_NOT_AVAILABLE) | Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
            StoreError::Busy(message)
        }
        Some(CHECK_VIOLATION) => StoreError::Validation(message),
        _ => match &err {
            SupabaseError::Api { status: 503, .. } => StoreError::Busy(message),
            SupabaseError::Transport(e) if e.is_timeout() => StoreError::Busy(message),
            _ => StoreError::Storage(message),
        },
    }
}

fn extract_uuid(message: &str) -> Option<Uuid> {
    message
        .split(|c: char| !(c.is_ascii_hexdigit() || c == '-'))
        .find_map(|token| Uuid::parse_str(token).ok())
}

fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Functions return a single composite; PostgREST may wrap it in an array.
fn single<T: for<'de> Deserialize<'de>>(value: Value) -> StoreResult<T> {
    let value = match value {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };
    serde_json::from_value(value)
        .map_err(|e| StoreError::Storage(format!("unexpected function result: {}", e)))
}

pub struct SupabaseLedgerStore {
    client: SupabaseClient,
    lock_timeout_ms: u64,
}

impl SupabaseLedgerStore {
    pub fn new(config: &AppConfig) -> StoreResult<Self> {
        reqwest::Url::parse(&config.supabase_url)
            .map_err(|e| StoreError::Validation(format!("invalid SUPABASE_URL: {}", e)))?;

        info!("Supabase ledger store targeting {}", config.supabase_url);
        Ok(Self {
            client: SupabaseClient::new(config),
            lock_timeout_ms: config.lock_timeout_ms,
        })
    }

    async fn fetch_schedules(&self, path: &str) -> StoreResult<Vec<ScheduleEntry>> {
        let rows: Vec<ScheduleRow> = self
            .client
            .request(Method::GET, path, None, None)
            .await
            .map_err(map_error)?;
        Ok(rows.into_iter().map(ScheduleEntry::from).collect())
    }

    async fn upsert_rows(&self, rows: Vec<ScheduleSeedRow<'_>>) -> StoreResult<Vec<ScheduleEntry>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::to_value(&rows)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        let path = format!("{}?on_conflict=doctor_id,schedule_date,period", SCHEDULES);
        let rows: Vec<ScheduleRow> = self
            .client
            .request(Method::POST, &path, Some(body), Some(UPSERT_PREFER))
            .await
            .map_err(map_error)?;
        let mut entries: Vec<ScheduleEntry> = rows.into_iter().map(ScheduleEntry::from).collect();
        sort_entries(&mut entries);
        Ok(entries)
    }
}

#[async_trait]
impl ScheduleStore for SupabaseLedgerStore {
    async fn upsert_capacity(&self, key: ScheduleKey, total_slots: i32) -> StoreResult<ScheduleEntry> {
        validate_total_slots(total_slots)?;
        self.upsert_rows(vec![ScheduleSeedRow::new(&key, total_slots)])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Storage(format!("upsert of {} returned no row", key)))
    }

    async fn batch_upsert_capacity(
        &self,
        doctor_id: &str,
        dates: &[NaiveDate],
        morning_slots: Option<i32>,
        afternoon_slots: Option<i32>,
    ) -> StoreResult<Vec<ScheduleEntry>> {
        let plan = plan_batch(doctor_id, dates, morning_slots, afternoon_slots)?;
        let rows = plan
            .iter()
            .map(|(key, total_slots)| ScheduleSeedRow::new(key, *total_slots))
            .collect();
        let entries = self.upsert_rows(rows).await?;
        info!("Seeded {} schedule entries for doctor {}", entries.len(), doctor_id);
        Ok(entries)
    }

    async fn update_capacity(&self, id: Uuid, total_slots: i32) -> StoreResult<ScheduleEntry> {
        validate_total_slots(total_slots)?;
        let path = format!("{}?id=eq.{}", SCHEDULES, id);
        let body = json!({
            "total_slots": total_slots,
            "remaining_slots": total_slots,
            "updated_at": Utc::now().to_rfc3339(),
        });
        let rows: Vec<ScheduleRow> = self
            .client
            .request(Method::PATCH, &path, Some(body), Some(RETURN_REPRESENTATION))
            .await
            .map_err(map_error)?;
        rows.into_iter()
            .next()
            .map(ScheduleEntry::from)
            .ok_or_else(|| StoreError::NotFound(format!("schedule {}", id)))
    }

    async fn get_entry(&self, key: &ScheduleKey) -> StoreResult<Option<ScheduleEntry>> {
        let path = format!(
            "{}?doctor_id=eq.{}&schedule_date=eq.{}&period=eq.{}",
            SCHEDULES,
            encode(&key.doctor_id),
            key.schedule_date,
            key.period
        );
        Ok(self.fetch_schedules(&path).await?.into_iter().next())
    }

    async fn list_entries(&self, query: &ScheduleQuery) -> StoreResult<Vec<ScheduleEntry>> {
        let mut filters = Vec::new();
        if let Some(doctor_id) = &query.doctor_id {
            filters.push(format!("doctor_id=eq.{}", encode(doctor_id)));
        }
        if let Some(from) = query.effective_from(today()) {
            filters.push(format!("schedule_date=gte.{}", from));
        }
        if let Some(to) = query.date_to {
            filters.push(format!("schedule_date=lte.{}", to));
        }
        filters.push("order=schedule_date.asc,doctor_id.asc".to_string());

        let path = format!("{}?{}", SCHEDULES, filters.join("&"));
        let mut entries = self.fetch_schedules(&path).await?;
        // Period names do not sort lexically in calendar order.
        sort_entries(&mut entries);
        Ok(entries)
    }
}

#[async_trait]
impl AppointmentStore for SupabaseLedgerStore {
    async fn insert(&self, appointment: NewAppointment) -> StoreResult<Appointment> {
        validate_new_appointment(&appointment)?;
        let row = AppointmentRow::from(appointment.into_pending());
        let body = serde_json::to_value(&row).map_err(|e| StoreError::Storage(e.to_string()))?;
        let rows: Vec<AppointmentRow> = self
            .client
            .request(Method::POST, APPOINTMENTS, Some(body), Some(RETURN_REPRESENTATION))
            .await
            .map_err(map_error)?;
        rows.into_iter()
            .next()
            .map(Appointment::from)
            .ok_or_else(|| StoreError::Storage("insert returned no row".to_string()))
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        let path = format!("{}?id=eq.{}", APPOINTMENTS, id);
        let rows: Vec<AppointmentRow> = self
            .client
            .request(Method::GET, &path, None, None)
            .await
            .map_err(map_error)?;
        Ok(rows.into_iter().next().map(Appointment::from))
    }

    async fn list(&self, filter: &AppointmentFilter) -> StoreResult<Vec<Appointment>> {
        let mut filters = Vec::new();
        if let Some(phone) = &filter.phone {
            filters.push(format!("patient_phone=eq.{}", encode(phone)));
        }
        if let Some(doctor_id) = &filter.doctor_id {
            filters.push(format!("doctor_id=eq.{}", encode(doctor_id)));
        }
        if let Some(status) = filter.status {
            filters.push(format!("status=eq.{}", status));
        }
        filters.push("order=created_at.desc".to_string());

        let path = format!("{}?{}", APPOINTMENTS, filters.join("&"));
        let rows: Vec<AppointmentRow> = self
            .client
            .request(Method::GET, &path, None, None)
            .await
            .map_err(map_error)?;
        let mut appointments: Vec<Appointment> = rows.into_iter().map(Appointment::from).collect();
        sort_newest_first(&mut appointments);
        Ok(appointments)
    }

    async fn mark_cancelled(&self, id: Uuid) -> StoreResult<Appointment> {
        // Conditional on the current status so a concurrent cancel cannot be applied twice.
        let path = format!("{}?id=eq.{}&status=eq.pending", APPOINTMENTS, id);
        let rows: Vec<AppointmentRow> = self
            .client
            .request(
                Method::PATCH,
                &path,
                Some(json!({ "status": AppointmentStatus::Cancelled })),
                Some(RETURN_REPRESENTATION),
            )
            .await
            .map_err(map_error)?;

        if let Some(row) = rows.into_iter().next() {
            return Ok(Appointment::from(row));
        }

        match self.get(id).await? {
            Some(_) => Err(StoreError::AlreadyCancelled(id)),
            None => Err(StoreError::NotFound(format!("appointment {}", id))),
        }
    }
}

#[async_trait]
impl LedgerStore for SupabaseLedgerStore {
    async fn book(&self, appointment: NewAppointment) -> StoreResult<Appointment> {
        validate_new_appointment(&appointment)?;
        let row = AppointmentRow::from(appointment.into_pending());
        let args = json!({
            "p_appointment": row,
            "p_lock_timeout_ms": self.lock_timeout_ms,
        });

        let value: Value = self.client.rpc("book_slot", args).await.map_err(map_error)?;
        let booked: AppointmentRow = single(value)?;
        debug!("Booked appointment {} via book_slot", booked.id);
        Ok(Appointment::from(booked))
    }

    async fn cancel(&self, id: Uuid) -> StoreResult<CancelOutcome> {
        let args = json!({
            "p_appointment_id": id,
            "p_lock_timeout_ms": self.lock_timeout_ms,
        });

        let value: Value = self
            .client
            .rpc("cancel_appointment", args)
            .await
            .map_err(map_error)?;
        let result: CancelResult = single(value)?;
        if !result.capacity_restored {
            warn!("Cancelled appointment {} without restoring capacity", id);
        }
        Ok(CancelOutcome {
            appointment: Appointment::from(result.appointment),
            capacity_restored: result.capacity_restored,
        })
    }

    async fn health_check(&self) -> StoreResult<()> {
        let path = format!("{}?select=id&limit=1", SCHEDULES);
        let _: Vec<Value> = self
            .client
            .request(Method::GET, &path, None, None)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "supabase"
    }
}
