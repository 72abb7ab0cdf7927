use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;
use shared_models::{today, ScheduleEntry};
use shared_utils::extractor::ValidatedJson;

use crate::models::{
    AdminScheduleView, BatchSeedRequest, DoctorScheduleParams, ScheduleListParams,
    SeedScheduleRequest, UpdateScheduleRequest,
};
use crate::services::seeding::ScheduleService;

// ==============================================================================
// PUBLIC SCHEDULE HANDLERS
// ==============================================================================

/// `GET /schedules?doctorId&startDate`
pub async fn list_schedules(
    State(service): State<Arc<ScheduleService>>,
    Query(params): Query<ScheduleListParams>,
) -> Result<Json<Vec<ScheduleEntry>>, AppError> {
    let doctor_id = params
        .doctor_id
        .as_deref()
        .ok_or_else(|| AppError::ValidationError("Missing doctorId".to_string()))?;

    let entries = service.list_for_doctor(doctor_id, params.start_date).await?;
    Ok(Json(entries))
}

/// `GET /doctors/{doctor_id}/schedules?startDate`
pub async fn get_doctor_schedules(
    State(service): State<Arc<ScheduleService>>,
    Path(doctor_id): Path<String>,
    Query(params): Query<DoctorScheduleParams>,
) -> Result<Json<Vec<ScheduleEntry>>, AppError> {
    let entries = service.list_for_doctor(&doctor_id, params.start_date).await?;
    Ok(Json(entries))
}

// ==============================================================================
// ADMIN SCHEDULE HANDLERS
// ==============================================================================

pub async fn admin_list_schedules(
    State(service): State<Arc<ScheduleService>>,
    Query(params): Query<ScheduleListParams>,
) -> Result<Json<AdminScheduleView>, AppError> {
    let view = service.admin_view(&params).await?;
    Ok(Json(view))
}

pub async fn seed_schedule(
    State(service): State<Arc<ScheduleService>>,
    ValidatedJson(request): ValidatedJson<SeedScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let entry = service.seed(request).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Schedule saved successfully",
        "id": entry.id,
        "schedule": entry
    })))
}

pub async fn batch_seed_schedules(
    State(service): State<Arc<ScheduleService>>,
    ValidatedJson(request): ValidatedJson<BatchSeedRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = service.batch_seed(request, today()).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully set schedules for {} days", outcome.count),
        "count": outcome.count,
        "schedules": outcome.entries
    })))
}

pub async fn update_schedule(
    State(service): State<Arc<ScheduleService>>,
    Path(schedule_id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<UpdateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let entry = service.update(schedule_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Schedule updated successfully",
        "schedule": entry
    })))
}
