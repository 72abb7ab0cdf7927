//! Storage contracts for the slot ledger.
//!
//! `ScheduleStore` and `AppointmentStore` are the plain table contracts. `LedgerStore` adds the two
//! operations that must run as one atomic, isolated unit against both tables: `book` and `cancel`.
//! Every backend implements the whole set so the transactional path never spans two backends.
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use shared_config::{AppConfig, LedgerBackend};
use shared_models::{
    Appointment, AppointmentFilter, CancelOutcome, NewAppointment, Period, ScheduleEntry,
    ScheduleKey, ScheduleQuery,
};

pub mod memory;
pub mod supabase;

pub use memory::InMemoryLedgerStore;
pub use supabase::SupabaseLedgerStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("this time slot has not been opened for booking: {0}")]
    NoSchedule(String),

    #[error("this time slot is full: {0}")]
    SlotsExhausted(String),

    #[error("appointment {0} is already cancelled")]
    AlreadyCancelled(Uuid),

    #[error("row lock not acquired: {0}")]
    Busy(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Busy(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Creates the entry or overwrites its capacity, resetting remaining to total.
    async fn upsert_capacity(&self, key: ScheduleKey, total_slots: i32) -> StoreResult<ScheduleEntry>;

    /// Seeds every (date, period) pair whose slot count is given, all or nothing.
    async fn batch_upsert_capacity(
        &self,
        doctor_id: &str,
        dates: &[NaiveDate],
        morning_slots: Option<i32>,
        afternoon_slots: Option<i32>,
    ) -> StoreResult<Vec<ScheduleEntry>>;

    /// Re-seeds an existing entry addressed by id.
    async fn update_capacity(&self, id: Uuid, total_slots: i32) -> StoreResult<ScheduleEntry>;

    async fn get_entry(&self, key: &ScheduleKey) -> StoreResult<Option<ScheduleEntry>>;

    /// Matching entries ordered by date, doctor, then period.
    async fn list_entries(&self, query: &ScheduleQuery) -> StoreResult<Vec<ScheduleEntry>>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Persists a pending record without touching capacity.
    async fn insert(&self, appointment: NewAppointment) -> StoreResult<Appointment>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Appointment>>;

    /// Matching records, newest first.
    async fn list(&self, filter: &AppointmentFilter) -> StoreResult<Vec<Appointment>>;

    /// Flips a pending record to cancelled without touching capacity.
    async fn mark_cancelled(&self, id: Uuid) -> StoreResult<Appointment>;
}

#[async_trait]
pub trait LedgerStore: ScheduleStore + AppointmentStore {
    /// Atomically checks and decrements remaining capacity and records the booking.
    async fn book(&self, appointment: NewAppointment) -> StoreResult<Appointment>;

    /// Atomically cancels the booking and restores one unit of capacity when the entry still exists.
    async fn cancel(&self, id: Uuid) -> StoreResult<CancelOutcome>;

    async fn health_check(&self) -> StoreResult<()>;

    fn backend_name(&self) -> &'static str;
}

pub fn validate_total_slots(total_slots: i32) -> StoreResult<()> {
    if total_slots < 0 {
        return Err(StoreError::Validation(format!(
            "totalSlots must be non-negative, got {}",
            total_slots
        )));
    }
    Ok(())
}

pub fn validate_new_appointment(appointment: &NewAppointment) -> StoreResult<()> {
    let missing = appointment.missing_fields();
    if !missing.is_empty() {
        return Err(StoreError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

/// Expands a batch request into concrete (key, total) writes, rejecting it before any write if a
/// count is negative.
pub fn plan_batch(
    doctor_id: &str,
    dates: &[NaiveDate],
    morning_slots: Option<i32>,
    afternoon_slots: Option<i32>,
) -> StoreResult<Vec<(ScheduleKey, i32)>> {
    if doctor_id.trim().is_empty() {
        return Err(StoreError::Validation("Missing doctorId".to_string()));
    }

    let periods: Vec<(Period, i32)> = [
        (Period::Morning, morning_slots),
        (Period::Afternoon, afternoon_slots),
    ]
    .into_iter()
    .filter_map(|(period, slots)| slots.map(|slots| (period, slots)))
    .collect();

    for (_, slots) in &periods {
        validate_total_slots(*slots)?;
    }

    let mut plan = Vec::with_capacity(dates.len() * periods.len());
    for date in dates {
        for (period, slots) in &periods {
            plan.push((ScheduleKey::new(doctor_id, *date, *period), *slots));
        }
    }
    Ok(plan)
}

/// Builds the backend selected by configuration.
pub fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match config.ledger_backend {
        LedgerBackend::Memory => Ok(Arc::new(InMemoryLedgerStore::new(config.lock_timeout()))),
        LedgerBackend::Supabase => {
            if !config.is_supabase_configured() {
                bail!("LEDGER_BACKEND=supabase requires SUPABASE_URL and SUPABASE_ANON_PUBLIC_KEY");
            }
            let store = SupabaseLedgerStore::new(config)
                .context("failed to create Supabase ledger store")?;
            Ok(Arc::new(store))
        }
    }
}
