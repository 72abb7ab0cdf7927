pub mod appointment;
pub mod error;
pub mod schedule;

pub use appointment::*;
pub use schedule::*;
