use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{AppointmentStore, LedgerStore, StoreError};
use shared_models::{Appointment, AppointmentFilter, CancelOutcome};

use crate::models::{BookAppointmentRequest, LedgerError};
use crate::services::notification::{notifier_from_config, BookingNotifier};

/// Booking and cancellation front of the ledger.
///
/// The store performs each `book`/`cancel` as one atomic unit. This layer validates input, retries
/// units that could not take their row lock in time, and hands committed bookings to the notifier.
pub struct SlotLedgerService {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn BookingNotifier>,
    max_busy_retries: u32,
    retry_backoff: Duration,
}

impl SlotLedgerService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        notifier: Arc<dyn BookingNotifier>,
        max_busy_retries: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            max_busy_retries,
            retry_backoff,
        }
    }

    pub fn from_config(config: &AppConfig, store: Arc<dyn LedgerStore>) -> Self {
        Self::new(
            store,
            notifier_from_config(config),
            config.max_busy_retries,
            config.retry_backoff(),
        )
    }

    /// Runs `op` until it returns something other than `Busy`, at most `max_busy_retries` extra
    /// times, sleeping `attempt * retry_backoff` in between.
    async fn with_busy_retry<T, F, Fut>(&self, what: &str, op: F) -> Result<T, LedgerError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Err(err) if err.is_retryable() && attempt < self.max_busy_retries => {
                    attempt += 1;
                    warn!(
                        "{} hit a busy row ({}), retrying attempt {}/{}",
                        what, err, attempt, self.max_busy_retries
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                result => return result.map_err(LedgerError::from),
            }
        }
    }

    #[instrument(skip(self, request), fields(doctor_id = ?request.doctor_id, period = ?request.period))]
    pub async fn book(&self, request: BookAppointmentRequest) -> Result<Appointment, LedgerError> {
        let new_appointment = request.into_new_appointment()?;
        let key = new_appointment.schedule_key();

        let appointment = self
            .with_busy_retry("book", || self.store.book(new_appointment.clone()))
            .await?;

        info!("Booked appointment {} on {}", appointment.id, key);
        self.dispatch_notification(&appointment);
        Ok(appointment)
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, id: Uuid) -> Result<CancelOutcome, LedgerError> {
        let outcome = self.with_busy_retry("cancel", || self.store.cancel(id)).await?;

        info!(
            "Cancelled appointment {} (capacity restored: {})",
            id, outcome.capacity_restored
        );
        Ok(outcome)
    }

    pub async fn get(&self, id: Uuid) -> Result<Appointment, LedgerError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, LedgerError> {
        let appointments = self.store.list(filter).await?;
        debug!("Listed {} appointments", appointments.len());
        Ok(appointments)
    }

    fn dispatch_notification(&self, appointment: &Appointment) {
        let notifier = self.notifier.clone();
        let appointment = appointment.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify_booked(&appointment).await {
                warn!("Booking notification for {} failed: {}", appointment.id, e);
            }
        });
    }
}
