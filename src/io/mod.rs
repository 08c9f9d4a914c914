//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `store` - Persistence seam for members and visits
//! - `sqlite` - SQLite implementation of the store
//! - `http` - HTTP JSON surface (door, admin and profile endpoints)
//! - `prometheus` - Prometheus text formatting for /metrics

pub mod http;
pub mod prometheus;
pub mod sqlite;
pub mod store;

// Re-export commonly used types
pub use http::{start_server, AppState};
pub use sqlite::SqliteStore;
pub use store::{StoreError, VisitStore};
