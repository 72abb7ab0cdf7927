use std::sync::Arc;

use axum::{
    routing::{get, put},
    Router,
};

use crate::handlers;
use crate::services::ledger::SlotLedgerService;

pub fn appointment_routes(service: Arc<SlotLedgerService>) -> Router {
    Router::new()
        .route(
            "/appointments",
            get(handlers::list_appointments).post(handlers::book_appointment),
        )
        .route("/appointments/{appointment_id}", get(handlers::get_appointment))
        .route("/appointments/{appointment_id}/cancel", put(handlers::cancel_appointment))
        .with_state(service)
}
