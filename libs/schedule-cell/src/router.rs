use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_database::LedgerStore;
use shared_utils::extractor::admin_key_middleware;

use crate::handlers;
use crate::services::seeding::ScheduleService;

pub fn schedule_routes(config: Arc<AppConfig>, store: Arc<dyn LedgerStore>) -> Router {
    let service = Arc::new(ScheduleService::new(store));

    let public_routes = Router::new()
        .route("/schedules", get(handlers::list_schedules))
        .route("/doctors/{doctor_id}/schedules", get(handlers::get_doctor_schedules));

    // Capacity seeding is an admin operation
    let admin_routes = Router::new()
        .route(
            "/admin/schedules",
            get(handlers::admin_list_schedules).post(handlers::seed_schedule),
        )
        .route("/admin/schedules/batch", post(handlers::batch_seed_schedules))
        .route("/admin/schedules/{schedule_id}", put(handlers::update_schedule))
        .layer(middleware::from_fn_with_state(config, admin_key_middleware));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .with_state(service)
}
