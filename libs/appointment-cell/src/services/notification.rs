//! Booking notifications to a WeCom group bot.
//!
//! Delivery is best effort. The ledger service spawns `notify_booked` after the booking has
//! committed and only logs a failure.
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_models::Appointment;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook rejected message: {errmsg} (errcode: {errcode})")]
    Rejected { errcode: i64, errmsg: String },

    #[error("Booking webhook is not configured")]
    NotConfigured,
}

#[async_trait]
pub trait BookingNotifier: Send + Sync {
    async fn notify_booked(&self, appointment: &Appointment) -> Result<(), NotificationError>;
}

/// Used when no webhook is configured.
pub struct NoopNotifier;

#[async_trait]
impl BookingNotifier for NoopNotifier {
    async fn notify_booked(&self, appointment: &Appointment) -> Result<(), NotificationError> {
        debug!("No booking webhook configured, skipping notice for {}", appointment.id);
        Ok(())
    }
}

/// Per-process count of bookings notified on the current local day.
#[derive(Debug)]
struct DailyCounter {
    date: NaiveDate,
    count: u32,
}

impl DailyCounter {
    fn next(&mut self, today: NaiveDate) -> u32 {
        if self.date != today {
            self.date = today;
            self.count = 0;
        }
        self.count += 1;
        self.count
    }
}

#[derive(Debug, Deserialize)]
struct WebhookReply {
    errcode: Option<i64>,
    errmsg: Option<String>,
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
    mention_all: bool,
    counter: Mutex<DailyCounter>,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>, mention_all: bool) -> Result<Self, NotificationError> {
        let webhook_url = webhook_url.into();
        if webhook_url.trim().is_empty() {
            return Err(NotificationError::NotConfigured);
        }

        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Ok(Self {
            client,
            webhook_url,
            mention_all,
            counter: Mutex::new(DailyCounter {
                date: Local::now().date_naive(),
                count: 0,
            }),
        })
    }

    fn next_order_number(&self, today: NaiveDate) -> u32 {
        self.counter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next(today)
    }

    fn payload(&self, content: String) -> Value {
        let mentioned: Vec<&str> = if self.mention_all { vec!["@all"] } else { Vec::new() };
        json!({
            "msgtype": "text",
            "text": {
                "content": content,
                "mentioned_list": mentioned,
                "mentioned_mobile_list": []
            }
        })
    }
}

#[async_trait]
impl BookingNotifier for WebhookNotifier {
    async fn notify_booked(&self, appointment: &Appointment) -> Result<(), NotificationError> {
        let submitted_at = appointment.created_at.with_timezone(&Local);
        let order_number = self.next_order_number(submitted_at.date_naive());
        let content = booking_message(order_number, appointment, submitted_at);

        let reply: WebhookReply = self
            .client
            .post(&self.webhook_url)
            .json(&self.payload(content))
            .send()
            .await?
            .json()
            .await?;

        match reply.errcode {
            Some(0) => {
                info!("Booking notice #{} sent for appointment {}", order_number, appointment.id);
                Ok(())
            }
            errcode => Err(NotificationError::Rejected {
                errcode: errcode.unwrap_or(-1),
                errmsg: reply.errmsg.unwrap_or_default(),
            }),
        }
    }
}

/// Text posted to the clinic group for one booking.
pub fn booking_message(order_number: u32, appointment: &Appointment, submitted_at: DateTime<Local>) -> String {
    let project = appointment
        .doctor
        .doctor_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(appointment.doctor_id.as_str());
    let message = appointment
        .patient
        .symptoms
        .as_deref()
        .filter(|symptoms| !symptoms.trim().is_empty())
        .unwrap_or("-");

    format!(
        "【今日第 {} 单】\n项目：{} {}\n电话：{}\n留言：{}\n\n提交时间：{}",
        order_number,
        project,
        appointment.period.label(),
        appointment.patient.patient_phone,
        message,
        submitted_at.format("%Y-%m-%d %H:%M:%S")
    )
}

pub fn notifier_from_config(config: &AppConfig) -> Arc<dyn BookingNotifier> {
    let Some(url) = config.booking_webhook_url.as_deref() else {
        return Arc::new(NoopNotifier);
    };
    match WebhookNotifier::new(url, config.booking_webhook_mention_all) {
        Ok(notifier) => {
            info!("Booking notifications enabled");
            Arc::new(notifier)
        }
        Err(e) => {
            warn!("Booking notifications disabled: {}", e);
            Arc::new(NoopNotifier)
        }
    }
}
