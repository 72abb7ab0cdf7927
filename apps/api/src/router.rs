use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use appointment_cell::{appointment_routes, SlotLedgerService};
use schedule_cell::schedule_routes;
use shared_config::AppConfig;
use shared_database::LedgerStore;

pub fn create_router(
    config: Arc<AppConfig>,
    store: Arc<dyn LedgerStore>,
    ledger: Arc<SlotLedgerService>,
) -> Router {
    Router::new()
        .route("/", get(|| async { "Slot ledger API is running!" }))
        .route("/health", get(health).with_state(store.clone()))
        .merge(schedule_routes(config, store))
        .merge(appointment_routes(ledger))
}

async fn health(State(store): State<Arc<dyn LedgerStore>>) -> (StatusCode, Json<Value>) {
    match store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "backend": store.backend_name() })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unavailable",
                "backend": store.backend_name(),
                "error": e.to_string()
            })),
        ),
    }
}
