use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Half-day booking window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[serde(alias = "上午")]
    Morning,
    #[serde(alias = "下午")]
    Afternoon,
}

impl Period {
    pub const ALL: [Period; 2] = [Period::Morning, Period::Afternoon];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Morning => "morning",
            Period::Afternoon => "afternoon",
        }
    }

    /// Label shown to clinic staff in notifications.
    pub fn label(&self) -> &'static str {
        match self {
            Period::Morning => "上午",
            Period::Afternoon => "下午",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "morning" | "上午" => Ok(Period::Morning),
            "afternoon" | "下午" => Ok(Period::Afternoon),
            other => Err(format!("invalid period: {}", other)),
        }
    }
}

/// Identity of a bookable slot: one doctor, one date, one period.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleKey {
    pub doctor_id: String,
    pub schedule_date: NaiveDate,
    pub period: Period,
}

impl ScheduleKey {
    pub fn new(doctor_id: impl Into<String>, schedule_date: NaiveDate, period: Period) -> Self {
        Self {
            doctor_id: doctor_id.into(),
            schedule_date,
            period,
        }
    }
}

impl fmt::Display for ScheduleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.doctor_id, self.schedule_date, self.period)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub id: Uuid,
    pub doctor_id: String,
    pub schedule_date: NaiveDate,
    pub period: Period,
    pub total_slots: i32,
    pub remaining_slots: i32,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleEntry {
    /// Fresh entry with all capacity available.
    pub fn seeded(key: ScheduleKey, total_slots: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id: key.doctor_id,
            schedule_date: key.schedule_date,
            period: key.period,
            total_slots,
            remaining_slots: total_slots,
            updated_at: Utc::now(),
        }
    }

    pub fn key(&self) -> ScheduleKey {
        ScheduleKey::new(self.doctor_id.clone(), self.schedule_date, self.period)
    }

    /// Overwrites capacity and discards prior consumption.
    pub fn reseed(&mut self, total_slots: i32) {
        self.total_slots = total_slots;
        self.remaining_slots = total_slots;
        self.updated_at = Utc::now();
    }

    pub fn booked_slots(&self) -> i32 {
        self.total_slots - self.remaining_slots
    }

    pub fn has_capacity(&self) -> bool {
        self.remaining_slots > 0
    }
}

/// Orders entries by date, then doctor, then period.
pub fn sort_entries(entries: &mut [ScheduleEntry]) {
    entries.sort_by(|a, b| {
        a.schedule_date
            .cmp(&b.schedule_date)
            .then_with(|| a.doctor_id.cmp(&b.doctor_id))
            .then_with(|| a.period.cmp(&b.period))
    });
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleQuery {
    pub doctor_id: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl ScheduleQuery {
    pub fn for_doctor(doctor_id: impl Into<String>) -> Self {
        Self {
            doctor_id: Some(doctor_id.into()),
            ..Self::default()
        }
    }

    /// Lower bound actually applied: with no bounds at all, entries before `today` are hidden.
    pub fn effective_from(&self, today: NaiveDate) -> Option<NaiveDate> {
        match (self.date_from, self.date_to) {
            (None, None) => Some(today),
            (from, _) => from,
        }
    }

    pub fn matches(&self, entry: &ScheduleEntry, today: NaiveDate) -> bool {
        if let Some(doctor_id) = &self.doctor_id {
            if &entry.doctor_id != doctor_id {
                return false;
            }
        }
        if let Some(from) = self.effective_from(today) {
            if entry.schedule_date < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if entry.schedule_date > to {
                return false;
            }
        }
        true
    }
}

/// Calendar date in the server's local timezone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
