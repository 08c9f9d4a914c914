//! Visit ledger and billing aggregation
//!
//! Reads visit records through a `VisitStore` and derives per-member monthly
//! counts, payment highlights and per-visit billing flags. Nothing derived here
//! is persisted; every listing is recomputed from the visit rows.
//!
//! Failure handling:
//! - A store failure aborts the whole call with `LedgerError::Store`
//! - A failure while computing one row's highlight only degrades that row to
//!   `Highlight::None` (logged at warn)

use crate::domain::billing::BillingPolicy;
use crate::domain::calendar::{Calendar, VISIT_LABEL_FORMAT};
use crate::domain::summary::{MemberProfile, MemberSummary, VisitDetail, VisitEntry, VisitSummary};
use crate::domain::types::{
    Highlight, Member, MemberFilter, MemberId, MemberType, MemberVisitCount, MonthKey, VisitId,
};
use crate::infra::{Config, Metrics};
use crate::io::store::{StoreError, StoreResult, VisitStore};
use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Fallback name used in confirmations when a member has no display name
pub const UNKNOWN_MEMBER_NAME: &str = "unknown member";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("member id must not be empty")]
    EmptyMemberId,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

pub struct VisitLedger<S> {
    store: S,
    policy: BillingPolicy,
    calendar: Calendar,
    metrics: Option<Arc<Metrics>>,
}

impl<S: VisitStore> VisitLedger<S> {
    pub fn new(store: S, policy: BillingPolicy, calendar: Calendar) -> Self {
        Self { store, policy, calendar, metrics: None }
    }

    pub fn from_config(store: S, config: &Config, metrics: Arc<Metrics>) -> Self {
        Self::new(store, BillingPolicy::new(config.billing_threshold()), config.calendar())
            .with_metrics(metrics)
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[inline]
    pub fn policy(&self) -> BillingPolicy {
        self.policy
    }

    #[inline]
    pub fn calendar(&self) -> Calendar {
        self.calendar
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// One row per member with at least one visit in `month`, ordered by
    /// count descending then display name
    pub fn monthly_summaries(
        &self,
        month: MonthKey,
        filter: &MemberFilter,
    ) -> Result<Vec<VisitSummary>> {
        let rows = self.checked("members_with_visits", self.store.members_with_visits(month, filter))?;

        let mut summaries: Vec<VisitSummary> =
            rows.into_iter().map(|row| self.summarize(row, month)).collect();
        summaries.sort_by(|a, b| {
            b.count.cmp(&a.count).then_with(|| a.display_name.cmp(&b.display_name))
        });
        Ok(summaries)
    }

    /// Members who visited today, each carrying their count for the current month
    pub fn today_summary(&self) -> Result<Vec<VisitSummary>> {
        self.today_summary_at(self.calendar.now())
    }

    pub fn today_summary_at(&self, now: NaiveDateTime) -> Result<Vec<VisitSummary>> {
        let today = now.date();
        let month = MonthKey::of(today);
        let rows = self.checked(
            "members_visiting_on",
            self.store.members_visiting_on(today, &MemberFilter::default()),
        )?;

        let mut summaries: Vec<VisitSummary> =
            rows.into_iter().map(|row| self.summarize(row, month)).collect();
        summaries.sort_by(today_order);
        Ok(summaries)
    }

    /// Every member with the current month's count, ordered by full name
    pub fn member_roster(&self, filter: &MemberFilter) -> Result<Vec<MemberSummary>> {
        self.member_roster_at(filter, self.calendar.now())
    }

    pub fn member_roster_at(
        &self,
        filter: &MemberFilter,
        now: NaiveDateTime,
    ) -> Result<Vec<MemberSummary>> {
        let month = MonthKey::of(now.date());
        let rows = self.checked("roster", self.store.roster(month, filter))?;

        let mut roster: Vec<MemberSummary> = rows
            .into_iter()
            .map(|row| MemberSummary::new(row.member, row.visit_count))
            .collect();
        roster.sort_by(|a, b| {
            a.full_name.cmp(&b.full_name).then_with(|| a.display_name.cmp(&b.display_name))
        });
        Ok(roster)
    }

    /// A member's visits in `month` (current month when None), earliest first
    pub fn user_monthly_detail(
        &self,
        member_id: &MemberId,
        month: Option<MonthKey>,
    ) -> Result<VisitDetail> {
        self.user_monthly_detail_at(member_id, month, self.calendar.now())
    }

    pub fn user_monthly_detail_at(
        &self,
        member_id: &MemberId,
        month: Option<MonthKey>,
        now: NaiveDateTime,
    ) -> Result<VisitDetail> {
        let current = MonthKey::of(now.date());
        let month = month.unwrap_or(current);

        let member = self
            .checked("member", self.store.member(member_id))?
            .unwrap_or_else(|| Member::new(member_id.clone()));
        let visits = self.checked("visits_for_member", self.store.visits_for_member(member_id, month))?;

        let entries: Vec<VisitEntry> = visits
            .into_iter()
            .zip(1u32..)
            .map(|(visit, position)| VisitEntry {
                id: visit.id,
                time_label: visit.visited_at.format(VISIT_LABEL_FORMAT).to_string(),
                visited_at: visit.visited_at,
                needs_payment: self.policy.needs_payment(member.member_type, position),
                paid: visit.paid,
            })
            .collect();

        Ok(VisitDetail {
            member_id: member.member_id,
            poster_id: member.poster_id,
            display_name: member.display_name,
            full_name: member.full_name,
            member_type: member.member_type,
            month,
            month_label: month.label(),
            is_prev: month == current.previous(),
            count: entries.len(),
            visits: entries,
        })
    }

    /// Whether every billable visit this month is paid. Fewer than
    /// `threshold` visits is trivially true.
    pub fn is_fully_paid_after_threshold(&self, member_id: &MemberId) -> Result<bool> {
        self.is_fully_paid_after_threshold_at(member_id, self.calendar.now())
    }

    pub fn is_fully_paid_after_threshold_at(
        &self,
        member_id: &MemberId,
        now: NaiveDateTime,
    ) -> Result<bool> {
        let month = MonthKey::of(now.date());
        self.checked("visits_for_member", self.settled_in(member_id, month))
    }

    /// Record a door check-in as a visit. Empty ids are ignored.
    pub fn record_check_in_visit(
        &self,
        member_id: &MemberId,
        display_name: &str,
    ) -> Result<Option<VisitId>> {
        self.record_check_in_visit_at(member_id, display_name, self.calendar.now())
    }

    pub fn record_check_in_visit_at(
        &self,
        member_id: &MemberId,
        display_name: &str,
        at: NaiveDateTime,
    ) -> Result<Option<VisitId>> {
        if member_id.is_empty() {
            return Ok(None);
        }
        let visit_id =
            self.checked("record_visit", self.store.record_visit(member_id, display_name, at))?;
        if let Some(metrics) = &self.metrics {
            metrics.record_visit_recorded();
        }
        debug!(member_id = %member_id, visit_id = %visit_id, "visit_recorded");
        Ok(Some(visit_id))
    }

    /// Returns false when the visit does not exist
    pub fn set_paid(&self, visit_id: VisitId, paid: bool) -> Result<bool> {
        let updated = self.checked("update_paid", self.store.update_paid(visit_id, paid))?;
        info!(visit_id = %visit_id, paid = %paid, updated = %updated, "visit_paid_updated");
        Ok(updated)
    }

    /// Add an unpaid visit stamped now (manual correction)
    pub fn add_visit(&self, member_id: &MemberId) -> Result<VisitId> {
        self.add_visit_at(member_id, self.calendar.now())
    }

    pub fn add_visit_at(&self, member_id: &MemberId, at: NaiveDateTime) -> Result<VisitId> {
        require_member_id(member_id)?;
        let visit_id = self.checked("insert_visit", self.store.insert_visit(member_id, at))?;
        info!(member_id = %member_id, visit_id = %visit_id, "visit_added");
        Ok(visit_id)
    }

    /// Returns false when the visit does not exist
    pub fn delete_visit(&self, visit_id: VisitId) -> Result<bool> {
        let deleted = self.checked("delete_visit", self.store.delete_visit(visit_id))?;
        info!(visit_id = %visit_id, deleted = %deleted, "visit_deleted");
        Ok(deleted)
    }

    /// Returns false when the member does not exist
    pub fn set_member_type(&self, member_id: &MemberId, member_type: MemberType) -> Result<bool> {
        require_member_id(member_id)?;
        let updated =
            self.checked("set_member_type", self.store.set_member_type(member_id, member_type))?;
        info!(member_id = %member_id, member_type = %member_type, updated = %updated, "member_type_updated");
        Ok(updated)
    }

    /// Set or clear (empty string) the poster id. Returns the member's display
    /// name for the confirmation message.
    pub fn set_poster_id(&self, member_id: &MemberId, poster_id: &str) -> Result<String> {
        require_member_id(member_id)?;
        let display_name = self
            .checked("member", self.store.member(member_id))?
            .map(|m| m.display_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_MEMBER_NAME.to_string());

        self.checked("set_poster_id", self.store.set_poster_id(member_id, poster_id))?;
        info!(member_id = %member_id, poster_id = %poster_id, "poster_id_updated");
        Ok(display_name)
    }

    /// Registered profile; None until the member has saved a full name
    pub fn member_profile(&self, member_id: &MemberId) -> Result<Option<MemberProfile>> {
        require_member_id(member_id)?;
        let member = self.checked("member", self.store.member(member_id))?;
        Ok(member.filter(|m| !m.full_name.is_empty()).map(|m| MemberProfile {
            full_name: m.full_name,
            member_type: m.member_type,
        }))
    }

    /// Save a self-registered profile. The full name is "{last} {first}".
    pub fn save_member_profile(
        &self,
        member_id: &MemberId,
        last_name: &str,
        first_name: &str,
        member_type: MemberType,
        display_name: &str,
    ) -> Result<()> {
        require_member_id(member_id)?;
        let full_name = format!("{} {}", last_name.trim(), first_name.trim());
        self.checked(
            "save_profile",
            self.store.save_profile(member_id, display_name, &full_name, member_type),
        )?;
        info!(member_id = %member_id, member_type = %member_type, "member_profile_saved");
        Ok(())
    }

    fn settled_in(&self, member_id: &MemberId, month: MonthKey) -> StoreResult<bool> {
        let visits = self.store.visits_for_member(member_id, month)?;
        Ok(self.policy.all_billable_paid(visits.iter().map(|v| v.paid)))
    }

    /// Build a listing row. Only billable rows touch the store again, and a
    /// failure there degrades the row instead of failing the listing.
    fn summarize(&self, row: MemberVisitCount, month: MonthKey) -> VisitSummary {
        let MemberVisitCount { member, visit_count } = row;

        let highlight = if self.policy.applies(member.member_type, visit_count) {
            match self.settled_in(&member.member_id, month) {
                Ok(settled) => Highlight::from_settled(settled),
                Err(e) => {
                    warn!(member_id = %member.member_id, month = %month, error = %e, "highlight_degraded");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_highlight_degraded();
                    }
                    Highlight::None
                }
            }
        } else {
            Highlight::None
        };

        VisitSummary::new(member, visit_count, highlight)
    }

    /// Log and count a store failure before handing it to the caller
    fn checked<T>(&self, op: &'static str, result: StoreResult<T>) -> Result<T> {
        result.map_err(|e| {
            error!(op = %op, error = %e, "store_operation_failed");
            if let Some(metrics) = &self.metrics {
                metrics.record_store_error();
            }
            LedgerError::from(e)
        })
    }
}

fn require_member_id(member_id: &MemberId) -> Result<()> {
    if member_id.is_empty() {
        return Err(LedgerError::EmptyMemberId);
    }
    Ok(())
}

fn today_order(a: &VisitSummary, b: &VisitSummary) -> Ordering {
    b.count
        .cmp(&a.count)
        .then_with(|| a.full_name.cmp(&b.full_name))
        .then_with(|| a.display_name.cmp(&b.display_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::TIMESTAMP_FORMAT;
    use crate::domain::types::StoredVisit;
    use crate::io::sqlite::SqliteStore;
    use chrono::NaiveDate;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    fn month(s: &str) -> MonthKey {
        s.parse().unwrap()
    }

    fn ledger() -> VisitLedger<SqliteStore> {
        VisitLedger::new(
            SqliteStore::open_in_memory().unwrap(),
            BillingPolicy::default(),
            Calendar::utc(),
        )
    }

    /// Insert `count` visits on consecutive days of November 2025; the
    /// first `paid` of them are marked paid
    fn seed(ledger: &VisitLedger<SqliteStore>, id: &str, name: &str, kind: MemberType, count: u32, paid: u32) {
        let member = MemberId::new(id);
        ledger.store().upsert_member(&member, name, kind).unwrap();
        for day in 1..=count {
            let visit = ledger
                .add_visit_at(&member, at(&format!("2025-11-{day:02} 18:00:00")))
                .unwrap();
            if day <= paid {
                ledger.set_paid(visit, true).unwrap();
            }
        }
    }

    #[test]
    fn test_five_visits_fully_paid_regardless_of_flags() {
        let ledger = ledger();
        seed(&ledger, "U1", "Taro", MemberType::OneDay, 5, 0);

        let paid = ledger
            .is_fully_paid_after_threshold_at(&MemberId::new("U1"), at("2025-11-30 12:00:00"))
            .unwrap();
        assert!(paid);
    }

    #[test]
    fn test_sixth_visit_unpaid_is_not_fully_paid() {
        let ledger = ledger();
        seed(&ledger, "U1", "Taro", MemberType::OneDay, 6, 5);

        let paid = ledger
            .is_fully_paid_after_threshold_at(&MemberId::new("U1"), at("2025-11-30 12:00:00"))
            .unwrap();
        assert!(!paid);
    }

    #[test]
    fn test_detail_flags_only_threshold_visit() {
        let ledger = ledger();
        seed(&ledger, "U1", "Taro", MemberType::OneDay, 6, 0);

        let detail = ledger
            .user_monthly_detail_at(&MemberId::new("U1"), None, at("2025-11-30 12:00:00"))
            .unwrap();
        let flags: Vec<bool> = detail.visits.iter().map(|v| v.needs_payment).collect();
        assert_eq!(flags, vec![false, false, false, false, false, true]);
        assert_eq!(detail.count, 6);
        assert_eq!(detail.month, month("2025-11"));
        assert_eq!(detail.month_label, "2025年11月");
        assert!(!detail.is_prev);
        assert_eq!(detail.visits[0].time_label, "2025/11/01 18:00");
    }

    #[test]
    fn test_detail_for_previous_month() {
        let ledger = ledger();
        seed(&ledger, "U1", "Taro", MemberType::General, 2, 0);

        let detail = ledger
            .user_monthly_detail_at(
                &MemberId::new("U1"),
                Some(month("2025-11")),
                at("2025-12-01 09:00:00"),
            )
            .unwrap();
        assert!(detail.is_prev);
        assert_eq!(detail.count, 2);
        assert!(detail.visits.iter().all(|v| !v.needs_payment));
    }

    #[test]
    fn test_detail_for_unknown_member_is_empty() {
        let ledger = ledger();
        let detail = ledger
            .user_monthly_detail_at(&MemberId::new("ghost"), None, at("2025-11-30 12:00:00"))
            .unwrap();
        assert_eq!(detail.count, 0);
        assert_eq!(detail.member_type, MemberType::General);
    }

    #[test]
    fn test_monthly_summaries_highlights() {
        let ledger = ledger();
        seed(&ledger, "red", "Red", MemberType::OneDay, 7, 6);
        seed(&ledger, "green", "Green", MemberType::OneDay, 6, 6);
        seed(&ledger, "under", "Under", MemberType::OneDay, 5, 0);
        seed(&ledger, "general", "General", MemberType::General, 8, 0);

        let rows = ledger.monthly_summaries(month("2025-11"), &MemberFilter::default()).unwrap();
        let find = |id: &str| rows.iter().find(|r| r.member_id.as_str() == id).unwrap();

        assert_eq!(find("red").highlight, Highlight::Red);
        assert_eq!(find("green").highlight, Highlight::Green);
        assert_eq!(find("under").highlight, Highlight::None);
        assert_eq!(find("general").highlight, Highlight::None);

        let ids: Vec<&str> = rows.iter().map(|r| r.member_id.as_str()).collect();
        assert_eq!(ids, vec!["general", "red", "green", "under"]);
    }

    #[test]
    fn test_monthly_summaries_exclude_members_without_visits() {
        let ledger = ledger();
        seed(&ledger, "U1", "Taro", MemberType::General, 2, 0);
        ledger.store().upsert_member(&MemberId::new("U2"), "Idle", MemberType::General).unwrap();

        let rows = ledger.monthly_summaries(month("2025-11"), &MemberFilter::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(ledger.monthly_summaries(month("2025-10"), &MemberFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_monthly_summaries_ties_sorted_by_display_name() {
        let ledger = ledger();
        seed(&ledger, "U1", "Bravo", MemberType::General, 2, 0);
        seed(&ledger, "U2", "Alpha", MemberType::General, 2, 0);

        let rows = ledger.monthly_summaries(month("2025-11"), &MemberFilter::default()).unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.display_name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Bravo"]);
    }

    #[test]
    fn test_monthly_summaries_filter() {
        let ledger = ledger();
        seed(&ledger, "U1", "Taro", MemberType::OneDay, 1, 0);
        seed(&ledger, "U2", "Hanako", MemberType::General, 1, 0);

        let by_text = MemberFilter::default().with_text("HANA");
        let rows = ledger.monthly_summaries(month("2025-11"), &by_text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].display_name, "Hanako");

        let by_type = MemberFilter::default().with_member_type(MemberType::OneDay);
        let rows = ledger.monthly_summaries(month("2025-11"), &by_type).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].display_name, "Taro");
    }

    #[test]
    fn test_plan_filter_skips_visits_without_member_row() {
        let ledger = ledger();
        ledger.add_visit_at(&MemberId::new("ghost"), at("2025-11-02 18:00:00")).unwrap();

        let general = MemberFilter::default().with_member_type(MemberType::General);
        assert!(ledger.monthly_summaries(month("2025-11"), &general).unwrap().is_empty());

        let rows = ledger.monthly_summaries(month("2025-11"), &MemberFilter::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].member_type, MemberType::General);
    }

    #[test]
    fn test_today_summary_uses_monthly_counts() {
        let ledger = ledger();
        seed(&ledger, "U1", "Taro", MemberType::OneDay, 6, 0);
        seed(&ledger, "U2", "Hanako", MemberType::General, 2, 0);

        // Only U1 visited on the 6th; U2's visits were on the 1st and 2nd
        let rows = ledger.today_summary_at(at("2025-11-06 21:00:00")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 6);
        assert_eq!(rows[0].highlight, Highlight::Red);
    }

    #[test]
    fn test_today_summary_ordering() {
        let ledger = ledger();
        let day = at("2025-11-15 10:00:00");
        for (id, full, display, visits) in
            [("U1", "B", "x", 1), ("U2", "A", "z", 1), ("U3", "A", "y", 1), ("U4", "Z", "w", 3)]
        {
            let member = MemberId::new(id);
            ledger.store().save_profile(&member, display, full, MemberType::General).unwrap();
            for _ in 0..visits {
                ledger.add_visit_at(&member, day).unwrap();
            }
        }

        let rows = ledger.today_summary_at(day).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.member_id.as_str()).collect();
        assert_eq!(ids, vec!["U4", "U3", "U2", "U1"]);
    }

    #[test]
    fn test_record_check_in_visit_ignores_empty_id() {
        let ledger = ledger();
        assert_eq!(ledger.record_check_in_visit(&MemberId::new(""), "x").unwrap(), None);

        let id = ledger
            .record_check_in_visit_at(&MemberId::new("U1"), "Taro", at("2025-11-03 18:20:00"))
            .unwrap();
        assert!(id.is_some());
    }

    #[test]
    fn test_set_poster_id_returns_display_name_or_fallback() {
        let ledger = ledger();
        ledger.store().upsert_member(&MemberId::new("U1"), "Taro", MemberType::General).unwrap();

        assert_eq!(ledger.set_poster_id(&MemberId::new("U1"), "P-1").unwrap(), "Taro");
        assert_eq!(ledger.set_poster_id(&MemberId::new("U2"), "P-2").unwrap(), UNKNOWN_MEMBER_NAME);
        assert!(matches!(
            ledger.set_poster_id(&MemberId::new(""), "P-3"),
            Err(LedgerError::EmptyMemberId)
        ));
    }

    #[test]
    fn test_profile_requires_full_name() {
        let ledger = ledger();
        let id = MemberId::new("U1");
        ledger.record_check_in_visit_at(&id, "Taro", at("2025-11-03 18:20:00")).unwrap();
        assert_eq!(ledger.member_profile(&id).unwrap(), None);

        ledger.save_member_profile(&id, "Yamada", "Taro", MemberType::OneDay, "Taro").unwrap();
        let profile = ledger.member_profile(&id).unwrap().unwrap();
        assert_eq!(profile.full_name, "Yamada Taro");
        assert_eq!(profile.member_type, MemberType::OneDay);
    }

    #[test]
    fn test_roster_includes_idle_members_sorted_by_full_name() {
        let ledger = ledger();
        ledger.store().save_profile(&MemberId::new("U1"), "t", "Yamada Taro", MemberType::General).unwrap();
        ledger.store().save_profile(&MemberId::new("U2"), "h", "Abe Hanako", MemberType::OneDay).unwrap();
        ledger.add_visit_at(&MemberId::new("U1"), at("2025-11-03 18:20:00")).unwrap();

        let roster = ledger.member_roster_at(&MemberFilter::default(), at("2025-11-30 00:00:00")).unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].full_name, "Abe Hanako");
        assert_eq!(roster[0].monthly_count, 0);
        assert_eq!(roster[1].monthly_count, 1);
    }

    /// Store whose per-member visit lookup always fails
    struct FlakyStore {
        rows: Vec<MemberVisitCount>,
    }

    impl VisitStore for FlakyStore {
        fn visits_for_member(&self, _: &MemberId, _: MonthKey) -> StoreResult<Vec<StoredVisit>> {
            Err(StoreError::InvalidTimestamp { visit_id: 1, value: "bogus".into() })
        }
        fn members_with_visits(&self, _: MonthKey, _: &MemberFilter) -> StoreResult<Vec<MemberVisitCount>> {
            Ok(self.rows.clone())
        }
        fn members_visiting_on(&self, _: NaiveDate, _: &MemberFilter) -> StoreResult<Vec<MemberVisitCount>> {
            Ok(self.rows.clone())
        }
        fn roster(&self, _: MonthKey, _: &MemberFilter) -> StoreResult<Vec<MemberVisitCount>> {
            Ok(self.rows.clone())
        }
        fn member(&self, _: &MemberId) -> StoreResult<Option<Member>> {
            Ok(None)
        }
        fn record_visit(&self, _: &MemberId, _: &str, _: NaiveDateTime) -> StoreResult<VisitId> {
            Ok(VisitId(1))
        }
        fn insert_visit(&self, _: &MemberId, _: NaiveDateTime) -> StoreResult<VisitId> {
            Ok(VisitId(1))
        }
        fn update_paid(&self, _: VisitId, _: bool) -> StoreResult<bool> {
            Ok(true)
        }
        fn delete_visit(&self, _: VisitId) -> StoreResult<bool> {
            Ok(true)
        }
        fn upsert_member(&self, _: &MemberId, _: &str, _: MemberType) -> StoreResult<()> {
            Ok(())
        }
        fn set_member_type(&self, _: &MemberId, _: MemberType) -> StoreResult<bool> {
            Ok(true)
        }
        fn set_poster_id(&self, _: &MemberId, _: &str) -> StoreResult<bool> {
            Ok(true)
        }
        fn save_profile(&self, _: &MemberId, _: &str, _: &str, _: MemberType) -> StoreResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_highlight_failure_degrades_row_only() {
        let mut billable = Member::new(MemberId::new("U1"));
        billable.member_type = MemberType::OneDay;
        let store = FlakyStore {
            rows: vec![
                MemberVisitCount { member: billable, visit_count: 7 },
                MemberVisitCount { member: Member::new(MemberId::new("U2")), visit_count: 2 },
            ],
        };
        let metrics = Arc::new(Metrics::new());
        let ledger = VisitLedger::new(store, BillingPolicy::default(), Calendar::utc())
            .with_metrics(metrics.clone());

        let rows = ledger.monthly_summaries(month("2025-11"), &MemberFilter::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.highlight == Highlight::None));
        assert_eq!(metrics.highlights_degraded_total(), 1);
    }

    #[test]
    fn test_store_failure_aborts_detail() {
        let metrics = Arc::new(Metrics::new());
        let ledger = VisitLedger::new(FlakyStore { rows: vec![] }, BillingPolicy::default(), Calendar::utc())
            .with_metrics(metrics.clone());

        let result = ledger.user_monthly_detail(&MemberId::new("U1"), None);
        assert!(matches!(result, Err(LedgerError::Store(_))));
        assert_eq!(metrics.store_errors_total(), 1);
    }
}
