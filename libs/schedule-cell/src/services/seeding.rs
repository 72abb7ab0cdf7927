use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use shared_database::{LedgerStore, ScheduleStore};
use shared_models::{ScheduleEntry, ScheduleQuery};

use crate::models::{
    AdminScheduleView, BatchSeedOutcome, BatchSeedRequest, MergedDaySchedule, ScheduleError,
    ScheduleListParams, SeedScheduleRequest, UpdateScheduleRequest, MAX_SCHEDULE_DAYS,
};

/// Every date in `start..=end`, bounded by `MAX_SCHEDULE_DAYS`.
pub fn dates_in_range(start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, ScheduleError> {
    if end < start {
        return Err(ScheduleError::ValidationError(format!(
            "endDate {} is before startDate {}",
            end, start
        )));
    }
    let span = (end - start).num_days() + 1;
    if span > MAX_SCHEDULE_DAYS {
        return Err(ScheduleError::ValidationError(format!(
            "Date range spans {} days, at most {} allowed",
            span, MAX_SCHEDULE_DAYS
        )));
    }
    Ok(start.iter_days().take(span as usize).collect())
}

/// `days` consecutive dates starting at `today`.
pub fn dates_from_today(today: NaiveDate, days: i64) -> Result<Vec<NaiveDate>, ScheduleError> {
    if !(1..=MAX_SCHEDULE_DAYS).contains(&days) {
        return Err(ScheduleError::ValidationError(format!(
            "days must be between 1 and {}, got {}",
            MAX_SCHEDULE_DAYS, days
        )));
    }
    dates_in_range(today, today + Duration::days(days - 1))
}

/// Resolves the dates a batch request covers into a concrete list.
pub fn materialize_dates(
    request: &BatchSeedRequest,
    today: NaiveDate,
) -> Result<Vec<NaiveDate>, ScheduleError> {
    match (request.start_date, request.end_date, request.days) {
        (Some(start), Some(end), _) => dates_in_range(start, end),
        (_, _, Some(days)) => dates_from_today(today, days),
        _ => Err(ScheduleError::ValidationError(
            "Missing date range or days parameter".to_string(),
        )),
    }
}

/// One row per day of `start..=end`, filled from whatever entries exist.
pub fn merge_by_day(
    doctor_id: &str,
    start: NaiveDate,
    end: NaiveDate,
    entries: &[ScheduleEntry],
) -> Result<Vec<MergedDaySchedule>, ScheduleError> {
    let mut days: BTreeMap<NaiveDate, MergedDaySchedule> = dates_in_range(start, end)?
        .into_iter()
        .map(|date| (date, MergedDaySchedule::empty(doctor_id, date)))
        .collect();

    for entry in entries.iter().filter(|e| e.doctor_id == doctor_id) {
        if let Some(day) = days.get_mut(&entry.schedule_date) {
            day.apply(entry);
        }
    }
    Ok(days.into_values().collect())
}

/// Admin and read side of the schedule table. Nothing here touches `remainingSlots` except
/// re-seeding, which resets it.
pub struct ScheduleService {
    store: Arc<dyn LedgerStore>,
}

impl ScheduleService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn list_for_doctor(
        &self,
        doctor_id: &str,
        start_date: Option<NaiveDate>,
    ) -> Result<Vec<ScheduleEntry>, ScheduleError> {
        if doctor_id.trim().is_empty() {
            return Err(ScheduleError::ValidationError("Missing doctorId".to_string()));
        }
        let query = ScheduleQuery {
            doctor_id: Some(doctor_id.to_string()),
            date_from: start_date,
            date_to: None,
        };
        let entries = self.store.list_entries(&query).await?;
        debug!("Found {} schedule entries for doctor {}", entries.len(), doctor_id);
        Ok(entries)
    }

    #[instrument(skip(self))]
    pub async fn admin_view(
        &self,
        params: &ScheduleListParams,
    ) -> Result<AdminScheduleView, ScheduleError> {
        let entries = self.store.list_entries(&params.to_query()).await?;
        match params.merge_range() {
            Some((doctor_id, start, end)) => {
                Ok(AdminScheduleView::Merged(merge_by_day(doctor_id, start, end, &entries)?))
            }
            None => Ok(AdminScheduleView::Entries(entries)),
        }
    }

    #[instrument(skip(self))]
    pub async fn seed(&self, request: SeedScheduleRequest) -> Result<ScheduleEntry, ScheduleError> {
        let (key, total_slots) = request.into_key()?;
        let entry = self.store.upsert_capacity(key, total_slots).await?;
        info!("Seeded schedule {} with {} slots", entry.key(), entry.total_slots);
        Ok(entry)
    }

    #[instrument(skip(self))]
    pub async fn batch_seed(
        &self,
        request: BatchSeedRequest,
        today: NaiveDate,
    ) -> Result<BatchSeedOutcome, ScheduleError> {
        let doctor_id = request
            .doctor_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ScheduleError::ValidationError("Missing doctorId".to_string()))?;
        let dates = materialize_dates(&request, today)?;

        let entries = self
            .store
            .batch_upsert_capacity(doctor_id, &dates, request.morning_slots, request.afternoon_slots)
            .await?;

        info!(
            "Batch seeded {} days ({} entries) for doctor {}",
            dates.len(),
            entries.len(),
            doctor_id
        );
        Ok(BatchSeedOutcome {
            count: dates.len(),
            entries,
        })
    }

    #[instrument(skip(self))]
    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateScheduleRequest,
    ) -> Result<ScheduleEntry, ScheduleError> {
        let total_slots = request
            .slots()
            .ok_or_else(|| ScheduleError::ValidationError("No fields to update".to_string()))?;
        let entry = self.store.update_capacity(id, total_slots).await?;
        info!("Updated schedule {} to {} slots", entry.key(), total_slots);
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn range_is_inclusive_and_crosses_months() {
        let dates = dates_in_range(date(2026, 1, 30), date(2026, 2, 2)).unwrap();
        assert_eq!(
            dates,
            vec![date(2026, 1, 30), date(2026, 1, 31), date(2026, 2, 1), date(2026, 2, 2)]
        );
    }

    #[test]
    fn reversed_or_oversized_ranges_are_rejected() {
        assert_matches!(
            dates_in_range(date(2026, 2, 2), date(2026, 2, 1)),
            Err(ScheduleError::ValidationError(_))
        );
        assert_matches!(
            dates_in_range(date(2026, 1, 1), date(2027, 1, 2)),
            Err(ScheduleError::ValidationError(_))
        );
        assert_eq!(dates_in_range(date(2028, 1, 1), date(2028, 12, 31)).unwrap().len(), 366);
    }

    #[test]
    fn day_count_starts_today() {
        let today = date(2026, 12, 30);
        let dates = dates_from_today(today, 3).unwrap();
        assert_eq!(dates, vec![today, date(2026, 12, 31), date(2027, 1, 1)]);
        assert_matches!(dates_from_today(today, 0), Err(ScheduleError::ValidationError(_)));
    }

    #[test]
    fn explicit_range_wins_over_days() {
        let request = BatchSeedRequest {
            days: Some(30),
            start_date: Some(date(2026, 5, 1)),
            end_date: Some(date(2026, 5, 2)),
            ..BatchSeedRequest::default()
        };
        assert_eq!(materialize_dates(&request, date(2026, 1, 1)).unwrap().len(), 2);
        assert_matches!(
            materialize_dates(&BatchSeedRequest::default(), date(2026, 1, 1)),
            Err(ScheduleError::ValidationError(_))
        );
    }
}
