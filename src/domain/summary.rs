//! Derived rows returned by the visit ledger
//!
//! None of these are persisted; they are rebuilt from visit records on
//! every request.

use crate::domain::types::{Highlight, Member, MemberId, MemberType, MonthKey, VisitId};
use chrono::NaiveDateTime;
use serde::Serialize;

/// One member's row in a monthly or daily listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitSummary {
    pub member_id: MemberId,
    pub display_name: String,
    pub full_name: String,
    pub member_type: MemberType,
    pub poster_id: String,
    /// Visits in the counting month
    pub count: u32,
    pub highlight: Highlight,
}

impl VisitSummary {
    pub fn new(member: Member, count: u32, highlight: Highlight) -> Self {
        Self {
            member_id: member.member_id,
            display_name: member.display_name,
            full_name: member.full_name,
            member_type: member.member_type,
            poster_id: member.poster_id,
            count,
            highlight,
        }
    }
}

/// A single visit in a member's monthly history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitEntry {
    pub id: VisitId,
    pub visited_at: NaiveDateTime,
    /// `visited_at` formatted for display (e.g. "2025/11/03 18:20")
    pub time_label: String,
    /// Billable under the per-visit threshold, independent of `paid`
    pub needs_payment: bool,
    pub paid: bool,
}

/// A member's visits for one month
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitDetail {
    pub member_id: MemberId,
    pub poster_id: String,
    pub display_name: String,
    pub full_name: String,
    pub member_type: MemberType,
    pub month: MonthKey,
    pub month_label: String,
    /// True when `month` is the calendar month before the current one
    pub is_prev: bool,
    pub count: usize,
    pub visits: Vec<VisitEntry>,
}

/// Roster row: every member, with this month's visit count (possibly zero)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub member_id: MemberId,
    pub display_name: String,
    pub full_name: String,
    pub member_type: MemberType,
    pub poster_id: String,
    pub monthly_count: u32,
}

impl MemberSummary {
    pub fn new(member: Member, monthly_count: u32) -> Self {
        Self {
            member_id: member.member_id,
            display_name: member.display_name,
            full_name: member.full_name,
            member_type: member.member_type,
            poster_id: member.poster_id,
            monthly_count,
        }
    }
}

/// Self-registered profile of a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberProfile {
    pub full_name: String,
    pub member_type: MemberType,
}
