pub mod store;
pub mod supabase;

pub use store::*;
