//! Guest billing state as it appears in stored JSON documents.
//!
//! GREEN when:
//! - Optional fields default (anchor, balance, charges, vacancy).
//! - Units and statuses use lowercase names.
//! - Unknown cycle units are rejected at the boundary.

use chrono::{DateTime, Utc};
use rbx_reconcile::*;

fn at(s: &str) -> DateTime<Utc> {
    s.parse().expect("valid rfc3339 timestamp")
}

#[test]
fn minimal_document_fills_defaults() {
    let doc = r#"{
        "due_date": "2024-03-01T00:00:00Z",
        "rent_amount": 5000,
        "rent_cycle_unit": "months",
        "rent_cycle_value": 1,
        "rent_status": "unpaid"
    }"#;
    let g: GuestBillingState = serde_json::from_str(doc).expect("parse");
    assert_eq!(g, GuestBillingState::new(at("2024-03-01T00:00:00Z"), 5000, CycleUnit::Months, 1));
}

#[test]
fn full_document_round_trips_through_reconcile() {
    let doc = r#"{
        "due_date": "2024-08-31T00:00:00Z",
        "rent_amount": 8000,
        "rent_cycle_unit": "months",
        "rent_cycle_value": 1,
        "billing_anchor_day": 31,
        "balance_brought_forward": 500,
        "rent_paid_amount": 3000,
        "rent_status": "partial",
        "additional_charges": [{"description": "electricity", "amount": 420}],
        "is_vacated": false,
        "exit_date": null
    }"#;
    let g: GuestBillingState = serde_json::from_str(doc).expect("parse");
    assert_eq!(g.total_due(), Some(500 + 420 + 8000 - 3000));

    let r = reconcile(&g, at("2024-10-01T00:00:00Z"));
    let out = serde_json::to_value(&r.guest).expect("serialize");
    assert_eq!(out["due_date"], "2024-09-30T00:00:00Z");
    assert_eq!(out["balance_brought_forward"], 8500);
    assert_eq!(out["rent_status"], "unpaid");
    assert_eq!(out["additional_charges"], serde_json::json!([]));
    assert_eq!(out["billing_anchor_day"], 31);
}

#[test]
fn unknown_cycle_unit_is_rejected() {
    let doc = r#"{
        "due_date": "2024-03-01T00:00:00Z",
        "rent_amount": 5000,
        "rent_cycle_unit": "fortnights",
        "rent_cycle_value": 1,
        "rent_status": "unpaid"
    }"#;
    assert!(serde_json::from_str::<GuestBillingState>(doc).is_err());
    assert_eq!(CycleUnit::parse(" Weeks "), Some(CycleUnit::Weeks));
    assert_eq!(CycleUnit::parse("fortnights"), None);
}

#[test]
fn reminder_serializes_with_kind_tag() {
    let g = GuestBillingState::new(at("2024-08-01T00:00:00Z"), 5000, CycleUnit::Months, 1);
    let r = reminder_for(&g, at("2024-08-04T06:00:00Z"));
    let v = serde_json::to_value(&r).expect("serialize");
    assert_eq!(v["kind"], "overdue");
    assert_eq!(v["elapsed"], 3);
    assert_eq!(v["unit"], "days");
}
