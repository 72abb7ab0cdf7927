pub mod ledger;
pub mod notification;
