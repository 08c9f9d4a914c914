//! Persistence seam for members and visit records
//!
//! The ledger only ever talks to a `VisitStore`. Every write commits fully or
//! returns an error; there are no partial updates.

use crate::domain::types::{
    Member, MemberFilter, MemberId, MemberType, MemberVisitCount, MonthKey, StoredVisit,
    UnknownMemberType, VisitId,
};
use chrono::{NaiveDate, NaiveDateTime};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to prepare database directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("visit {visit_id} has an invalid timestamp {value:?}")]
    InvalidTimestamp { visit_id: i64, value: String },

    #[error(transparent)]
    UnknownMemberType(#[from] UnknownMemberType),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable storage for members and their visits
///
/// Listing methods return rows unordered; ordering is the ledger's job.
pub trait VisitStore: Send + Sync {
    /// A member's visits within `month`, earliest first
    fn visits_for_member(&self, member_id: &MemberId, month: MonthKey)
        -> StoreResult<Vec<StoredVisit>>;

    /// Members with at least one visit in `month`, with that month's count
    fn members_with_visits(
        &self,
        month: MonthKey,
        filter: &MemberFilter,
    ) -> StoreResult<Vec<MemberVisitCount>>;

    /// Members with at least one visit on `day`. The count is the member's
    /// total for the month containing `day`, not for the day itself.
    fn members_visiting_on(
        &self,
        day: NaiveDate,
        filter: &MemberFilter,
    ) -> StoreResult<Vec<MemberVisitCount>>;

    /// Every known member with their count for `month` (zero included)
    fn roster(&self, month: MonthKey, filter: &MemberFilter) -> StoreResult<Vec<MemberVisitCount>>;

    fn member(&self, member_id: &MemberId) -> StoreResult<Option<Member>>;

    /// Upsert the member and insert an unpaid visit in one transaction
    fn record_visit(
        &self,
        member_id: &MemberId,
        display_name: &str,
        at: NaiveDateTime,
    ) -> StoreResult<VisitId>;

    fn insert_visit(&self, member_id: &MemberId, at: NaiveDateTime) -> StoreResult<VisitId>;

    /// Returns false when no visit has that id
    fn update_paid(&self, visit_id: VisitId, paid: bool) -> StoreResult<bool>;

    /// Returns false when no visit has that id
    fn delete_visit(&self, visit_id: VisitId) -> StoreResult<bool>;

    /// Insert with `member_type`, or refresh only the display name if the
    /// member already exists
    fn upsert_member(
        &self,
        member_id: &MemberId,
        display_name: &str,
        member_type: MemberType,
    ) -> StoreResult<()>;

    /// Returns false when the member does not exist
    fn set_member_type(&self, member_id: &MemberId, member_type: MemberType) -> StoreResult<bool>;

    /// Empty `poster_id` clears it. Returns false when the member does not exist.
    fn set_poster_id(&self, member_id: &MemberId, poster_id: &str) -> StoreResult<bool>;

    /// Update the registered profile, inserting the member if absent
    fn save_profile(
        &self,
        member_id: &MemberId,
        display_name: &str,
        full_name: &str,
        member_type: MemberType,
    ) -> StoreResult<()>;
}
