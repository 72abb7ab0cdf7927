use assert_matches::assert_matches;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_database::{
    AppointmentStore, LedgerStore, ScheduleStore, StoreError, SupabaseLedgerStore,
};
use shared_models::{AppointmentStatus, Period, ScheduleQuery};
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestFixtures};

async fn store_for(server: &MockServer) -> SupabaseLedgerStore {
    SupabaseLedgerStore::new(&TestConfig::with_supabase_url(server.uri()).to_app_config())
        .expect("valid mock server url")
}

#[tokio::test]
async fn book_calls_book_slot_function() {
    let server = MockServer::start().await;
    let key = TestFixtures::slot(TestFixtures::DOCTOR_ID, 1, Period::Morning);
    let booking = TestFixtures::booking(&key, "13800000001");
    let id = booking.id;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_slot"))
        .and(header("apikey", "test-anon-key"))
        .and(body_partial_json(json!({
            "p_appointment": { "id": id, "doctor_id": TestFixtures::DOCTOR_ID, "period": "morning" },
            "p_lock_timeout_ms": 2000
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            MockSupabaseResponses::appointment_row(id, &key, "13800000001", "pending"),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let booked = store.book(booking).await.unwrap();

    assert_eq!(booked.id, id);
    assert_eq!(booked.status, AppointmentStatus::Pending);
    assert_eq!(booked.patient.patient_phone, "13800000001");
}

#[tokio::test]
async fn book_maps_function_errors() {
    let server = MockServer::start().await;
    let key = TestFixtures::slot(TestFixtures::DOCTOR_ID, 1, Period::Afternoon);

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_slot"))
        .respond_with(ResponseTemplate::new(400).set_body_json(
            MockSupabaseResponses::postgrest_error("LS002", "this time slot is full"),
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_slot"))
        .respond_with(ResponseTemplate::new(400).set_body_json(
            MockSupabaseResponses::postgrest_error("LS001", "this time slot has not been opened"),
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_slot"))
        .respond_with(ResponseTemplate::new(500).set_body_json(
            MockSupabaseResponses::postgrest_error("55P03", "canceling statement due to lock timeout"),
        ))
        .mount(&server)
        .await;

    let store = store_for(&server).await;

    assert_matches!(
        store.book(TestFixtures::booking(&key, "1")).await,
        Err(StoreError::SlotsExhausted(_))
    );
    assert_matches!(
        store.book(TestFixtures::booking(&key, "2")).await,
        Err(StoreError::NoSchedule(_))
    );
    assert_matches!(
        store.book(TestFixtures::booking(&key, "3")).await,
        Err(StoreError::Busy(_))
    );
}

#[tokio::test]
async fn book_validates_before_calling_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let key = TestFixtures::slot(TestFixtures::DOCTOR_ID, 1, Period::Morning);
    let mut booking = TestFixtures::booking(&key, "13800000001");
    booking.patient.patient_phone = "  ".to_string();

    let store = store_for(&server).await;
    assert_matches!(store.book(booking).await, Err(StoreError::Validation(_)));
}

#[tokio::test]
async fn cancel_reports_restored_capacity() {
    let server = MockServer::start().await;
    let key = TestFixtures::slot(TestFixtures::DOCTOR_ID, 2, Period::Morning);
    let id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/cancel_appointment"))
        .and(body_partial_json(json!({ "p_appointment_id": id })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "appointment": MockSupabaseResponses::appointment_row(id, &key, "13800000002", "cancelled"),
            "capacity_restored": true
        })))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let outcome = store.cancel(id).await.unwrap();

    assert!(outcome.capacity_restored);
    assert_eq!(outcome.appointment.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn cancel_maps_already_cancelled_and_missing() {
    let server = MockServer::start().await;
    let cancelled = Uuid::new_v4();
    let missing = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/cancel_appointment"))
        .and(body_partial_json(json!({ "p_appointment_id": cancelled })))
        .respond_with(ResponseTemplate::new(400).set_body_json(
            MockSupabaseResponses::postgrest_error(
                "LS004",
                &format!("appointment {} is already cancelled", cancelled),
            ),
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/cancel_appointment"))
        .and(body_partial_json(json!({ "p_appointment_id": missing })))
        .respond_with(ResponseTemplate::new(400).set_body_json(
            MockSupabaseResponses::postgrest_error("LS003", &format!("appointment {} not found", missing)),
        ))
        .mount(&server)
        .await;

    let store = store_for(&server).await;

    assert_matches!(store.cancel(cancelled).await, Err(StoreError::AlreadyCancelled(id)) if id == cancelled);
    assert_matches!(store.cancel(missing).await, Err(StoreError::NotFound(_)));
}

#[tokio::test]
async fn upsert_merges_on_slot_key() {
    let server = MockServer::start().await;
    let key = TestFixtures::slot(TestFixtures::DOCTOR_ID, 3, Period::Afternoon);

    Mock::given(method("POST"))
        .and(path("/rest/v1/doctor_schedules"))
        .and(query_param("on_conflict", "doctor_id,schedule_date,period"))
        .and(header("Prefer", "resolution=merge-duplicates,return=representation"))
        .and(body_partial_json(json!([{ "total_slots": 6, "remaining_slots": 6 }])))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([MockSupabaseResponses::schedule_row(&key, 6, 6)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let entry = store.upsert_capacity(key.clone(), 6).await.unwrap();

    assert_eq!(entry.key(), key);
    assert_eq!(entry.remaining_slots, 6);
}

#[tokio::test]
async fn negative_capacity_never_reaches_the_database() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let dates = [TestFixtures::date_in(1), TestFixtures::date_in(2)];

    assert_matches!(
        store.batch_upsert_capacity("doc-1", &dates, Some(3), Some(-1)).await,
        Err(StoreError::Validation(_))
    );
    assert_matches!(
        store
            .upsert_capacity(TestFixtures::slot("doc-1", 1, Period::Morning), -5)
            .await,
        Err(StoreError::Validation(_))
    );
}

#[tokio::test]
async fn list_entries_sorts_periods_in_calendar_order() {
    let server = MockServer::start().await;
    let morning = TestFixtures::slot(TestFixtures::DOCTOR_ID, 1, Period::Morning);
    let afternoon = TestFixtures::slot(TestFixtures::DOCTOR_ID, 1, Period::Afternoon);

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_schedules"))
        .and(query_param("doctor_id", format!("eq.{}", TestFixtures::DOCTOR_ID)))
        .and(query_param("schedule_date", format!("gte.{}", TestFixtures::date_in(0))))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::schedule_row(&afternoon, 4, 4),
            MockSupabaseResponses::schedule_row(&morning, 4, 1),
        ])))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let entries = store
        .list_entries(&ScheduleQuery::for_doctor(TestFixtures::DOCTOR_ID))
        .await
        .unwrap();

    let periods: Vec<_> = entries.iter().map(|e| e.period).collect();
    assert_eq!(periods, vec![Period::Morning, Period::Afternoon]);
}

#[tokio::test]
async fn update_capacity_of_unknown_entry_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctor_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    assert_matches!(
        store.update_capacity(Uuid::new_v4(), 3).await,
        Err(StoreError::NotFound(_))
    );
}

#[tokio::test]
async fn mark_cancelled_falls_back_to_lookup() {
    let server = MockServer::start().await;
    let key = TestFixtures::slot(TestFixtures::DOCTOR_ID, 1, Period::Morning);
    let id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(id, &key, "13800000003", "cancelled")
        ])))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    assert_matches!(store.mark_cancelled(id).await, Err(StoreError::AlreadyCancelled(found)) if found == id);
}

#[tokio::test]
async fn health_check_probes_schedules_table() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_schedules"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    store.health_check().await.unwrap();
    assert_eq!(store.backend_name(), "supabase");
}
