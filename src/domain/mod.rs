//! Domain models - core business types and billing rules
//!
//! This module contains the canonical data types used throughout the system:
//! - `types` - identifiers, members, visits, month keys and listing filters
//! - `billing` - per-visit payment threshold rules
//! - `calendar` - local wall-clock for visit timestamps
//! - `summary` - derived rows returned by the visit ledger

pub mod billing;
pub mod calendar;
pub mod summary;
pub mod types;

// Re-export commonly used types at module level
pub use billing::BillingPolicy;
pub use calendar::Calendar;
pub use summary::{MemberProfile, MemberSummary, VisitDetail, VisitEntry, VisitSummary};
pub use types::{
    Highlight, Member, MemberFilter, MemberId, MemberType, MemberVisitCount, MonthKey,
    StoredVisit, VisitId,
};
