use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;
use shared_models::Appointment;
use shared_utils::extractor::ValidatedJson;

use crate::models::{AppointmentListParams, BookAppointmentRequest};
use crate::services::ledger::SlotLedgerService;

/// `POST /appointments`
#[axum::debug_handler]
pub async fn book_appointment(
    State(service): State<Arc<SlotLedgerService>>,
    ValidatedJson(request): ValidatedJson<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let appointment = service.book(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Appointment booked successfully",
            "appointment": appointment
        })),
    ))
}

/// `GET /appointments?phone&doctorId&status`, newest first.
pub async fn list_appointments(
    State(service): State<Arc<SlotLedgerService>>,
    Query(params): Query<AppointmentListParams>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let filter = params.to_filter()?;
    let appointments = service.list(&filter).await?;
    Ok(Json(appointments))
}

pub async fn get_appointment(
    State(service): State<Arc<SlotLedgerService>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    let appointment = service.get(appointment_id).await?;
    Ok(Json(appointment))
}

/// `PUT /appointments/{appointment_id}/cancel`
#[axum::debug_handler]
pub async fn cancel_appointment(
    State(service): State<Arc<SlotLedgerService>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let outcome = service.cancel(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment cancelled successfully",
        "capacityRestored": outcome.capacity_restored,
        "appointment": outcome.appointment
    })))
}
