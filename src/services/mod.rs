//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `occupancy` - Live headcount with lazy session expiry
//! - `ledger` - Visit ledger and billing aggregation

pub mod ledger;
pub mod occupancy;

// Re-export commonly used types
pub use ledger::{LedgerError, VisitLedger};
pub use occupancy::OccupancyStore;
