pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use router::appointment_routes;
pub use services::ledger::SlotLedgerService;
pub use services::notification::{BookingNotifier, NoopNotifier, WebhookNotifier};
