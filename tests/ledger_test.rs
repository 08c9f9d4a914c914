//! End-to-end ledger tests against an on-disk SQLite database

use checkin_gateway::domain::calendar::TIMESTAMP_FORMAT;
use checkin_gateway::domain::{BillingPolicy, Calendar, Highlight, MemberFilter, MemberId, MemberType, MonthKey};
use checkin_gateway::io::{SqliteStore, VisitStore};
use checkin_gateway::services::VisitLedger;
use chrono::NaiveDateTime;
use tempfile::TempDir;

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
}

fn open(dir: &TempDir) -> VisitLedger<SqliteStore> {
    let store = SqliteStore::open(dir.path().join("data").join("checkin.db")).unwrap();
    VisitLedger::new(store, BillingPolicy::default(), Calendar::utc())
}

#[test]
fn test_visits_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let member = MemberId::new("U1");

    {
        let ledger = open(&dir);
        ledger.record_check_in_visit_at(&member, "Taro", at("2025-11-03 18:20:00")).unwrap();
        ledger.record_check_in_visit_at(&member, "Taro", at("2025-11-04 18:20:00")).unwrap();
    }

    let ledger = open(&dir);
    let detail = ledger
        .user_monthly_detail_at(&member, None, at("2025-11-30 12:00:00"))
        .unwrap();
    assert_eq!(detail.count, 2);
    assert_eq!(detail.display_name, "Taro");
}

#[test]
fn test_one_day_member_billing_lifecycle() {
    let dir = TempDir::new().unwrap();
    let ledger = open(&dir);
    let member = MemberId::new("U1");
    let month: MonthKey = "2025-11".parse().unwrap();
    let end_of_month = at("2025-11-30 23:00:00");

    for day in 1..=7 {
        ledger
            .record_check_in_visit_at(&member, "Taro", at(&format!("2025-11-{day:02} 19:00:00")))
            .unwrap();
    }
    assert!(ledger.set_member_type(&member, MemberType::OneDay).unwrap());

    let detail = ledger.user_monthly_detail_at(&member, Some(month), end_of_month).unwrap();
    let billable: Vec<bool> = detail.visits.iter().map(|v| v.needs_payment).collect();
    assert_eq!(billable, vec![false, false, false, false, false, true, true]);

    // Pay visits 1-6; the 7th is still open
    for visit in detail.visits.iter().take(6) {
        ledger.set_paid(visit.id, true).unwrap();
    }
    let rows = ledger.monthly_summaries(month, &MemberFilter::default()).unwrap();
    assert_eq!(rows[0].highlight, Highlight::Red);
    assert!(!ledger.is_fully_paid_after_threshold_at(&member, end_of_month).unwrap());

    // Settling the last billable visit turns the row green
    ledger.set_paid(detail.visits[6].id, true).unwrap();
    let rows = ledger.monthly_summaries(month, &MemberFilter::default()).unwrap();
    assert_eq!(rows[0].highlight, Highlight::Green);
    assert!(ledger.is_fully_paid_after_threshold_at(&member, end_of_month).unwrap());

    // Deleting a visit drops the count below the threshold
    ledger.delete_visit(detail.visits[6].id).unwrap();
    ledger.delete_visit(detail.visits[5].id).unwrap();
    let rows = ledger.monthly_summaries(month, &MemberFilter::default()).unwrap();
    assert_eq!(rows[0].count, 5);
    assert_eq!(rows[0].highlight, Highlight::None);
}

#[test]
fn test_previous_month_listing_is_independent() {
    let dir = TempDir::new().unwrap();
    let ledger = open(&dir);
    let member = MemberId::new("U1");
    ledger.store().upsert_member(&member, "Taro", MemberType::OneDay).unwrap();

    for day in 1..=6 {
        ledger.add_visit_at(&member, at(&format!("2025-10-{day:02} 10:00:00"))).unwrap();
    }
    ledger.add_visit_at(&member, at("2025-11-01 10:00:00")).unwrap();

    let october = ledger
        .monthly_summaries("2025-10".parse().unwrap(), &MemberFilter::default())
        .unwrap();
    assert_eq!(october[0].count, 6);
    assert_eq!(october[0].highlight, Highlight::Red);

    let november = ledger
        .monthly_summaries("2025-11".parse().unwrap(), &MemberFilter::default())
        .unwrap();
    assert_eq!(november[0].count, 1);
    assert_eq!(november[0].highlight, Highlight::None);

    // November's status only looks at November
    assert!(ledger.is_fully_paid_after_threshold_at(&member, at("2025-11-15 10:00:00")).unwrap());
}
