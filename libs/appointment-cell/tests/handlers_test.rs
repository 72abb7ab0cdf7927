use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use axum::{
    body::{to_bytes, Body},
    extract::{Path, Query, State},
    http::{Request, StatusCode},
    Json,
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::handlers::*;
use appointment_cell::models::{AppointmentListParams, BookAppointmentRequest};
use appointment_cell::{appointment_routes, NoopNotifier, SlotLedgerService};
use shared_database::{InMemoryLedgerStore, LedgerStore, ScheduleStore};
use shared_models::error::AppError;
use shared_models::{Period, ScheduleKey};
use shared_utils::extractor::ValidatedJson;
use shared_utils::test_utils::TestFixtures;

async fn state_with_slot(key: &ScheduleKey, total: i32) -> State<Arc<SlotLedgerService>> {
    let store = Arc::new(InMemoryLedgerStore::new(Duration::from_secs(1)));
    store.upsert_capacity(key.clone(), total).await.unwrap();
    let store: Arc<dyn LedgerStore> = store;
    State(Arc::new(SlotLedgerService::new(
        store,
        Arc::new(NoopNotifier),
        0,
        Duration::from_millis(10),
    )))
}

fn booking(key: &ScheduleKey, phone: &str) -> ValidatedJson<BookAppointmentRequest> {
    ValidatedJson(serde_json::from_value(TestFixtures::booking_body(key, phone)).unwrap())
}

#[tokio::test]
async fn book_appointment_returns_created() {
    let key = TestFixtures::slot(TestFixtures::DOCTOR_ID, 1, Period::Morning);
    let State(service) = state_with_slot(&key, 2).await;

    let (status, Json(body)) = book_appointment(State(service.clone()), booking(&key, "13900000001"))
        .await
        .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["appointment"]["status"], "pending");
    assert_eq!(body["appointment"]["patientPhone"], "13900000001");
    assert_eq!(body["appointment"]["hospitalName"], "Riverside General Hospital");
}

#[tokio::test]
async fn book_appointment_maps_ledger_failures_to_bad_request() {
    let key = TestFixtures::slot(TestFixtures::DOCTOR_ID, 1, Period::Afternoon);
    let State(service) = state_with_slot(&key, 1).await;

    book_appointment(State(service.clone()), booking(&key, "13900000002"))
        .await
        .unwrap();

    let full = book_appointment(State(service.clone()), booking(&key, "13900000003")).await;
    assert_matches!(full, Err(AppError::BadRequest(msg)) if msg.contains("full"));

    let unopened = TestFixtures::slot(TestFixtures::DOCTOR_ID, 9, Period::Morning);
    let closed = book_appointment(State(service.clone()), booking(&unopened, "13900000004")).await;
    assert_matches!(closed, Err(AppError::BadRequest(msg)) if msg.contains("not been opened"));

    let missing = book_appointment(State(service), ValidatedJson(BookAppointmentRequest::default())).await;
    assert_matches!(missing, Err(AppError::ValidationError(_)));
}

#[tokio::test]
async fn cancel_appointment_twice_is_bad_request() {
    let key = TestFixtures::slot(TestFixtures::DOCTOR_ID, 1, Period::Morning);
    let State(service) = state_with_slot(&key, 1).await;

    let (_, Json(body)) = book_appointment(State(service.clone()), booking(&key, "13900000005"))
        .await
        .unwrap();
    let id: Uuid = serde_json::from_value(body["appointment"]["id"].clone()).unwrap();

    let Json(cancelled) = cancel_appointment(State(service.clone()), Path(id)).await.unwrap();
    assert_eq!(cancelled["success"], true);
    assert_eq!(cancelled["capacityRestored"], true);

    let again = cancel_appointment(State(service.clone()), Path(id)).await;
    assert_matches!(again, Err(AppError::BadRequest(_)));

    let unknown = cancel_appointment(State(service), Path(Uuid::new_v4())).await;
    assert_matches!(unknown, Err(AppError::NotFound(_)));
}

#[tokio::test]
async fn list_and_get_appointments() {
    let key = TestFixtures::slot(TestFixtures::DOCTOR_ID, 1, Period::Morning);
    let State(service) = state_with_slot(&key, 5).await;

    for phone in ["13900000006", "13900000006", "13900000007"] {
        book_appointment(State(service.clone()), booking(&key, phone)).await.unwrap();
    }

    let Json(mine) = list_appointments(
        State(service.clone()),
        Query(AppointmentListParams {
            phone: Some("13900000006".to_string()),
            ..AppointmentListParams::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine[0].created_at >= mine[1].created_at);

    let Json(found) = get_appointment(State(service.clone()), Path(mine[0].id)).await.unwrap();
    assert_eq!(found, mine[0]);

    let bad_status = list_appointments(
        State(service.clone()),
        Query(AppointmentListParams {
            status: Some("completed".to_string()),
            ..AppointmentListParams::default()
        }),
    )
    .await;
    assert_matches!(bad_status, Err(AppError::ValidationError(_)));

    let missing = get_appointment(State(service), Path(Uuid::new_v4())).await;
    assert_matches!(missing, Err(AppError::NotFound(_)));
}

// ==============================================================================
// ROUTER
// ==============================================================================

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn routes_book_list_and_cancel() {
    let key = TestFixtures::slot("doc-route", 2, Period::Afternoon);
    let State(service) = state_with_slot(&key, 1).await;
    let app = appointment_routes(service);

    let (status, body) = send(
        app.clone(),
        Request::builder()
            .method("POST")
            .uri("/appointments")
            .header("content-type", "application/json")
            .body(Body::from(TestFixtures::booking_body(&key, "13900000008").to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["appointment"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        app.clone(),
        Request::builder()
            .method("POST")
            .uri("/appointments")
            .header("content-type", "application/json")
            .body(Body::from(TestFixtures::booking_body(&key, "13900000009").to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "This time slot is full");

    let (status, body) = send(
        app.clone(),
        Request::builder()
            .uri("/appointments?doctorId=doc-route&status=pending")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let cancel = |id: &str| {
        Request::builder()
            .method("PUT")
            .uri(format!("/appointments/{}/cancel", id))
            .body(Body::empty())
            .unwrap()
    };
    let (status, _) = send(app.clone(), cancel(&id)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(app.clone(), cancel(&id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(app, cancel(&Uuid::new_v4().to_string())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_booking_bodies_are_bad_requests() {
    let key = TestFixtures::slot("doc-malformed", 1, Period::Morning);
    let State(service) = state_with_slot(&key, 1).await;
    let app = appointment_routes(service.clone());

    let mut bad_period = TestFixtures::booking_body(&key, "13900000010");
    bad_period["period"] = Value::from("evening");
    let mut bad_date = TestFixtures::booking_body(&key, "13900000011");
    bad_date["scheduleDate"] = Value::from("2026/05/01");

    for body in [bad_period.to_string(), bad_date.to_string(), "{\"doctorId\":".to_string()] {
        let (status, response) = send(
            app.clone(),
            Request::builder()
                .method("POST")
                .uri("/appointments")
                .header("content-type", "application/json")
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
        assert!(response["error"].is_string(), "{} answered {}", body, response);
    }

    // The slot is untouched by rejected bodies
    let valid = serde_json::from_value(TestFixtures::booking_body(&key, "13900000012")).unwrap();
    assert!(service.book(valid).await.is_ok());
}
