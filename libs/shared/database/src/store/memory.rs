//! In-memory implementation of the ledger store.
//!
//! Each schedule entry and each appointment is a row with its own exclusive lock. The lock is what a
//! transaction holds (the equivalent of `SELECT ... FOR UPDATE`); the row value itself sits behind a
//! short-lived `std::sync::RwLock` that is never held across an `.await`, so plain reads never wait
//! on an in-flight booking and only ever observe committed values.
//!
//! Every operation acquires locks in one global order: appointment row, then the `schedules` map,
//! then schedule rows, then the `appointments` map. So `cancel` may wait on the `schedules` map and a
//! schedule row with its appointment row held, and `book` inserts into the `appointments` map under
//! the schedule row lock.
//!
//! `batch_upsert_capacity` keeps the `schedules` write lock while it waits on the rows it re-seeds, so
//! a batch stalls bookings on every key until its contended rows free up.
//! Row lock acquisition is bounded by `lock_timeout` and fails with `StoreError::Busy`.
//!
//! Not durable: all state is lost on restart.
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::{
    sort_entries, sort_newest_first, today, Appointment, AppointmentFilter, AppointmentStatus,
    CancelOutcome, NewAppointment, ScheduleEntry, ScheduleKey, ScheduleQuery,
};

use super::{
    plan_batch, validate_new_appointment, validate_total_slots, AppointmentStore, LedgerStore,
    ScheduleStore, StoreError, StoreResult,
};

struct Row<T> {
    lock: Arc<Mutex<()>>,
    value: StdRwLock<T>,
}

impl<T: Clone> Row<T> {
    fn new(value: T) -> Arc<Self> {
        Arc::new(Self {
            lock: Arc::new(Mutex::new(())),
            value: StdRwLock::new(value),
        })
    }

    fn snapshot(&self) -> T {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, value: T) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

/// Exclusive hold on one row for the duration of a transaction.
pub struct RowLock<T> {
    row: Arc<Row<T>>,
    _guard: OwnedMutexGuard<()>,
}

impl<T: Clone> RowLock<T> {
    /// Current committed value of the locked row.
    pub fn current(&self) -> T {
        self.row.snapshot()
    }

    fn commit(&self, value: T) {
        self.row.store(value);
    }
}

pub type SlotLock = RowLock<ScheduleEntry>;

#[derive(Default)]
struct ScheduleTable {
    rows: HashMap<ScheduleKey, Arc<Row<ScheduleEntry>>>,
    ids: HashMap<Uuid, ScheduleKey>,
}

impl ScheduleTable {
    fn insert(&mut self, entry: ScheduleEntry) -> ScheduleEntry {
        self.ids.insert(entry.id, entry.key());
        self.rows.insert(entry.key(), Row::new(entry.clone()));
        entry
    }
}

pub struct InMemoryLedgerStore {
    lock_timeout: Duration,
    schedules: RwLock<ScheduleTable>,
    appointments: RwLock<HashMap<Uuid, Arc<Row<Appointment>>>>,
}

impl InMemoryLedgerStore {
    pub fn new(lock_timeout: Duration) -> Self {
        info!("In-memory ledger store initialized (lock timeout {:?})", lock_timeout);
        Self {
            lock_timeout,
            schedules: RwLock::new(ScheduleTable::default()),
            appointments: RwLock::new(HashMap::new()),
        }
    }

    async fn lock_row<T: Clone>(&self, row: Arc<Row<T>>, what: &str) -> StoreResult<RowLock<T>> {
        match tokio::time::timeout(self.lock_timeout, row.lock.clone().lock_owned()).await {
            Ok(guard) => Ok(RowLock { row, _guard: guard }),
            Err(_) => {
                warn!("Timed out after {:?} waiting for row lock on {}", self.lock_timeout, what);
                Err(StoreError::Busy(what.to_string()))
            }
        }
    }

    async fn slot_row(&self, key: &ScheduleKey) -> Option<Arc<Row<ScheduleEntry>>> {
        self.schedules.read().await.rows.get(key).cloned()
    }

    async fn appointment_row(&self, id: Uuid) -> Option<Arc<Row<Appointment>>> {
        self.appointments.read().await.get(&id).cloned()
    }

    /// Locks the schedule row for `key`, waiting at most the configured lock timeout.
    /// Returns `None` when no entry exists for the key.
    pub async fn lock_slot(&self, key: &ScheduleKey) -> StoreResult<Option<SlotLock>> {
        match self.slot_row(key).await {
            Some(row) => self.lock_row(row, &key.to_string()).await.map(Some),
            None => Ok(None),
        }
    }

    async fn insert_appointment_row(&self, appointment: Appointment) -> StoreResult<Appointment> {
        let mut appointments = self.appointments.write().await;
        if appointments.contains_key(&appointment.id) {
            return Err(StoreError::Validation(format!(
                "appointment {} already exists",
                appointment.id
            )));
        }
        appointments.insert(appointment.id, Row::new(appointment.clone()));
        Ok(appointment)
    }
}

#[async_trait]
impl ScheduleStore for InMemoryLedgerStore {
    async fn upsert_capacity(&self, key: ScheduleKey, total_slots: i32) -> StoreResult<ScheduleEntry> {
        validate_total_slots(total_slots)?;

        let existing = {
            let mut table = self.schedules.write().await;
            match table.rows.get(&key) {
                Some(row) => row.clone(),
                None => {
                    let entry = table.insert(ScheduleEntry::seeded(key, total_slots));
                    debug!("Opened schedule {} with {} slots", entry.key(), total_slots);
                    return Ok(entry);
                }
            }
        };

        let lock = self.lock_row(existing, &key.to_string()).await?;
        let mut entry = lock.current();
        entry.reseed(total_slots);
        lock.commit(entry.clone());

        debug!("Re-seeded schedule {} to {} slots", key, total_slots);
        Ok(entry)
    }

    async fn batch_upsert_capacity(
        &self,
        doctor_id: &str,
        dates: &[NaiveDate],
        morning_slots: Option<i32>,
        afternoon_slots: Option<i32>,
    ) -> StoreResult<Vec<ScheduleEntry>> {
        let plan = plan_batch(doctor_id, dates, morning_slots, afternoon_slots)?;

        // Holding the table write lock keeps the batch invisible until every row is written.
        let mut table = self.schedules.write().await;

        let mut held = Vec::new();
        for (key, total_slots) in &plan {
            if let Some(row) = table.rows.get(key).cloned() {
                held.push((self.lock_row(row, &key.to_string()).await?, *total_slots));
            }
        }

        let mut written = Vec::with_capacity(plan.len());
        for (lock, total_slots) in &held {
            let mut entry = lock.current();
            entry.reseed(*total_slots);
            lock.commit(entry.clone());
            written.push(entry);
        }
        for (key, total_slots) in plan {
            if !table.rows.contains_key(&key) {
                written.push(table.insert(ScheduleEntry::seeded(key, total_slots)));
            }
        }

        sort_entries(&mut written);
        info!("Seeded {} schedule entries for doctor {}", written.len(), doctor_id);
        Ok(written)
    }

    async fn update_capacity(&self, id: Uuid, total_slots: i32) -> StoreResult<ScheduleEntry> {
        validate_total_slots(total_slots)?;

        let key = self
            .schedules
            .read()
            .await
            .ids
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("schedule {}", id)))?;

        self.upsert_capacity(key, total_slots).await
    }

    async fn get_entry(&self, key: &ScheduleKey) -> StoreResult<Option<ScheduleEntry>> {
        Ok(self.slot_row(key).await.map(|row| row.snapshot()))
    }

    async fn list_entries(&self, query: &ScheduleQuery) -> StoreResult<Vec<ScheduleEntry>> {
        let today = today();
        let table = self.schedules.read().await;
        let mut entries: Vec<ScheduleEntry> = table
            .rows
            .values()
            .map(|row| row.snapshot())
            .filter(|entry| query.matches(entry, today))
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }
}

#[async_trait]
impl AppointmentStore for InMemoryLedgerStore {
    async fn insert(&self, appointment: NewAppointment) -> StoreResult<Appointment> {
        validate_new_appointment(&appointment)?;
        self.insert_appointment_row(appointment.into_pending()).await
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        Ok(self.appointment_row(id).await.map(|row| row.snapshot()))
    }

    async fn list(&self, filter: &AppointmentFilter) -> StoreResult<Vec<Appointment>> {
        let appointments = self.appointments.read().await;
        let mut matching: Vec<Appointment> = appointments
            .values()
            .map(|row| row.snapshot())
            .filter(|appointment| filter.matches(appointment))
            .collect();
        sort_newest_first(&mut matching);
        Ok(matching)
    }

    async fn mark_cancelled(&self, id: Uuid) -> StoreResult<Appointment> {
        let row = self
            .appointment_row(id)
            .await
            .ok_or_else(|| StoreError::NotFound(format!("appointment {}", id)))?;
        let lock = self.lock_row(row, &format!("appointment {}", id)).await?;

        let mut appointment = lock.current();
        if appointment.status == AppointmentStatus::Cancelled {
            return Err(StoreError::AlreadyCancelled(id));
        }
        appointment.status = AppointmentStatus::Cancelled;
        lock.commit(appointment.clone());
        Ok(appointment)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn book(&self, appointment: NewAppointment) -> StoreResult<Appointment> {
        validate_new_appointment(&appointment)?;
        let key = appointment.schedule_key();

        let slot = self
            .lock_slot(&key)
            .await?
            .ok_or_else(|| StoreError::NoSchedule(key.to_string()))?;

        let mut entry = slot.current();
        if !entry.has_capacity() {
            return Err(StoreError::SlotsExhausted(key.to_string()));
        }

        // Nothing below can fail once the appointment row is in, so the decrement lands with it.
        let booked = self.insert_appointment_row(appointment.into_pending()).await?;
        entry.remaining_slots -= 1;
        entry.updated_at = Utc::now();
        slot.commit(entry.clone());

        debug!(
            "Booked appointment {} on {} ({} of {} slots left)",
            booked.id, key, entry.remaining_slots, entry.total_slots
        );
        Ok(booked)
    }

    async fn cancel(&self, id: Uuid) -> StoreResult<CancelOutcome> {
        let row = self
            .appointment_row(id)
            .await
            .ok_or_else(|| StoreError::NotFound(format!("appointment {}", id)))?;
        let appointment_lock = self.lock_row(row, &format!("appointment {}", id)).await?;

        let mut appointment = appointment_lock.current();
        if appointment.status == AppointmentStatus::Cancelled {
            return Err(StoreError::AlreadyCancelled(id));
        }

        let key = appointment.schedule_key();
        let slot = self.lock_slot(&key).await?;

        appointment.status = AppointmentStatus::Cancelled;
        appointment_lock.commit(appointment.clone());

        let capacity_restored = match slot {
            Some(slot) => {
                let mut entry = slot.current();
                if entry.remaining_slots < entry.total_slots {
                    entry.remaining_slots += 1;
                    entry.updated_at = Utc::now();
                    slot.commit(entry);
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        if !capacity_restored {
            debug!("Cancelled appointment {} without restoring capacity on {}", id, key);
        }

        Ok(CancelOutcome {
            appointment,
            capacity_restored,
        })
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
