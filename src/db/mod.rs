//! Database module for HostPulse.
//!
//! Provides SQLite storage for probe history and the monitored host set.

mod models;
mod store;

pub use models::*;
pub use store::*;
