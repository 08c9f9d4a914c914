//! Shared types for the check-in gateway

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Newtype wrapper for member identifiers (the LINE user id)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Newtype wrapper for visit row ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct VisitId(pub i64);

impl fmt::Display for VisitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Member plan type
///
/// `General` members pay a flat fee. `OneDay` members hold a single-visit
/// pass and are billed per visit once they pass the monthly free allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MemberType {
    #[default]
    #[serde(rename = "general")]
    General,
    #[serde(rename = "1day")]
    OneDay,
}

impl MemberType {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberType::General => "general",
            MemberType::OneDay => "1day",
        }
    }
}

impl fmt::Display for MemberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a plan type string is not `general` or `1day`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown member type {0:?}")]
pub struct UnknownMemberType(pub String);

impl FromStr for MemberType {
    type Err = UnknownMemberType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(MemberType::General),
            "1day" => Ok(MemberType::OneDay),
            other => Err(UnknownMemberType(other.to_string())),
        }
    }
}

/// Calendar month, rendered as `YYYY-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// Returns None unless `month` is 1..=12
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// The month containing `date`
    pub fn of(date: NaiveDate) -> Self {
        Self { year: date.year(), month: date.month() }
    }

    #[inline]
    pub fn year(&self) -> i32 {
        self.year
    }

    #[inline]
    pub fn month(&self) -> u32 {
        self.month
    }

    /// The calendar month before this one
    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    /// Display label used by the admin screens (e.g. "2025年10月")
    pub fn label(&self) -> String {
        format!("{}年{}月", self.year, self.month)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let first = NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d")?;
        Ok(Self::of(first))
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Payment highlight for a member's month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Highlight {
    /// Not billable (general plan, or under the threshold)
    #[default]
    None,
    /// Threshold reached and at least one billable visit unpaid
    Red,
    /// Threshold reached and every billable visit paid
    Green,
}

impl Highlight {
    pub fn from_settled(all_paid: bool) -> Self {
        if all_paid {
            Highlight::Green
        } else {
            Highlight::Red
        }
    }
}

/// A visit row as held by the persistence layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVisit {
    pub id: VisitId,
    /// Local wall-clock time of the visit
    pub visited_at: NaiveDateTime,
    pub paid: bool,
}

/// A member row. Visits can reference ids with no member row; those resolve
/// to empty names and the general plan, with `registered` unset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Member {
    pub member_id: MemberId,
    pub display_name: String,
    pub full_name: String,
    pub poster_id: String,
    pub member_type: MemberType,
    /// A members row exists for this id
    pub registered: bool,
}

impl Member {
    pub fn new(member_id: MemberId) -> Self {
        Self { member_id, ..Default::default() }
    }
}

/// A member together with the number of visits in some counting window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberVisitCount {
    pub member: Member,
    pub visit_count: u32,
}

/// Filter applied to member listings
///
/// `text` matches case-insensitively against display name, full name,
/// poster id or member id (any one is enough). `member_type` restricts the
/// plan type and only matches ids that have a members row. Both are ANDed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberFilter {
    text: Option<String>,
    member_type: Option<MemberType>,
}

impl MemberFilter {
    /// Build a filter from raw query parameters. Blank text and unknown plan
    /// types are ignored rather than rejected.
    pub fn from_params(text: &str, member_type: &str) -> Self {
        let text = text.trim();
        Self {
            text: (!text.is_empty()).then(|| text.to_lowercase()),
            member_type: member_type.parse().ok(),
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = (!text.is_empty()).then(|| text.to_lowercase());
        self
    }

    pub fn with_member_type(mut self, member_type: MemberType) -> Self {
        self.member_type = Some(member_type);
        self
    }

    pub fn matches(&self, member: &Member) -> bool {
        if let Some(member_type) = self.member_type {
            if !member.registered || member.member_type != member_type {
                return false;
            }
        }

        let Some(needle) = self.text.as_deref() else {
            return true;
        };

        [
            member.display_name.as_str(),
            member.full_name.as_str(),
            member.poster_id.as_str(),
            member.member_id.as_str(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, display: &str, full: &str, poster: &str, typ: MemberType) -> Member {
        Member {
            member_id: MemberId::new(id),
            display_name: display.to_string(),
            full_name: full.to_string(),
            poster_id: poster.to_string(),
            member_type: typ,
            registered: true,
        }
    }

    #[test]
    fn test_member_new_is_unregistered_general() {
        let m = Member::new(MemberId::new("U1"));
        assert_eq!(m.member_id.as_str(), "U1");
        assert_eq!(m.display_name, "");
        assert_eq!(m.member_type, MemberType::General);
        assert!(!m.registered);
        assert_eq!(MemberId::default().as_str(), "");
    }

    #[test]
    fn test_member_type_round_trip_strings() {
        assert_eq!("general".parse::<MemberType>(), Ok(MemberType::General));
        assert_eq!("1day".parse::<MemberType>(), Ok(MemberType::OneDay));
        assert_eq!(MemberType::OneDay.as_str(), "1day");
        assert!("vip".parse::<MemberType>().is_err());
    }

    #[test]
    fn test_month_key_parse_and_display() {
        let month: MonthKey = "2025-03".parse().unwrap();
        assert_eq!(month.year(), 2025);
        assert_eq!(month.month(), 3);
        assert_eq!(month.to_string(), "2025-03");
        assert_eq!(month.label(), "2025年3月");
        assert!("2025-13".parse::<MonthKey>().is_err());
        assert!("garbage".parse::<MonthKey>().is_err());
    }

    #[test]
    fn test_month_key_previous_wraps_year() {
        let jan = MonthKey::new(2026, 1).unwrap();
        assert_eq!(jan.previous(), MonthKey::new(2025, 12).unwrap());
        assert_eq!(MonthKey::new(2026, 7).unwrap().previous().month(), 6);
        assert!(MonthKey::new(2026, 0).is_none());
    }

    #[test]
    fn test_month_key_serializes_as_string() {
        let json = serde_json::to_string(&MonthKey::new(2025, 11).unwrap()).unwrap();
        assert_eq!(json, "\"2025-11\"");
    }

    #[test]
    fn test_filter_text_matches_any_field_case_insensitive() {
        let m = member("U123abc", "Taro", "Yamada Taro", "P-77", MemberType::General);

        assert!(MemberFilter::from_params("taro", "").matches(&m));
        assert!(MemberFilter::from_params("YAMADA", "").matches(&m));
        assert!(MemberFilter::from_params("p-7", "").matches(&m));
        assert!(MemberFilter::from_params("u123", "").matches(&m));
        assert!(!MemberFilter::from_params("hanako", "").matches(&m));
    }

    #[test]
    fn test_filter_type_and_text_are_combined() {
        let general = member("U1", "Taro", "", "", MemberType::General);
        let one_day = member("U2", "Taro", "", "", MemberType::OneDay);
        let filter = MemberFilter::from_params("taro", "1day");

        assert!(!filter.matches(&general));
        assert!(filter.matches(&one_day));
    }

    #[test]
    fn test_filter_ignores_blank_text_and_unknown_type() {
        let filter = MemberFilter::from_params("   ", "premium");
        assert_eq!(filter, MemberFilter::default());
        assert!(filter.matches(&member("U1", "", "", "", MemberType::OneDay)));
    }

    #[test]
    fn test_filter_type_requires_member_row() {
        let mut ghost = Member::new(MemberId::new("ghost"));
        assert!(!MemberFilter::default().with_member_type(MemberType::General).matches(&ghost));
        assert!(MemberFilter::default().matches(&ghost));
        assert!(MemberFilter::from_params("gho", "").matches(&ghost));

        ghost.registered = true;
        assert!(MemberFilter::default().with_member_type(MemberType::General).matches(&ghost));
    }
}
