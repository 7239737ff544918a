//! Tests for domain value types: serialization, display, and value semantics.

use chrono::{Duration, Utc};
use repricer::domain::entities::price_decision::{DecisionContext, DecisionStatus, PriceDecision};
use repricer::domain::error::{FailureClass, UpstreamError};
use repricer::domain::values::alert::AlertKind;
use repricer::domain::values::execution::ExecutionMode;
use repricer::domain::values::floor::FloorRecord;
use repricer::domain::values::reason_code::ReasonCode;
use repricer::domain::values::trigger::{Priority, TriggerKind};
use rust_decimal::Decimal;

fn decision(old: i64, new: i64, reason: ReasonCode) -> PriceDecision {
    PriceDecision::new(
        "SKU-1".into(),
        "MP".into(),
        Decimal::new(old, 2),
        Decimal::new(new, 2),
        None,
        None,
        reason,
        DecisionContext::new(),
        Utc::now(),
    )
}

#[test]
fn test_execution_mode_display() {
    assert_eq!(ExecutionMode::DryRun.to_string(), "dry_run");
    assert_eq!(ExecutionMode::Live.to_string(), "live");
}

#[test]
fn test_execution_mode_serialization() {
    assert_eq!(serde_json::to_string(&ExecutionMode::DryRun).unwrap(), "\"dry_run\"");
    let live: ExecutionMode = serde_json::from_str("\"live\"").unwrap();
    assert_eq!(live, ExecutionMode::Live);
    assert_eq!("test".parse::<ExecutionMode>().unwrap(), ExecutionMode::DryRun);
    assert!(!ExecutionMode::DryRun.submits());
}

#[test]
fn test_reason_code_wire_names() {
    assert_eq!(serde_json::to_string(&ReasonCode::FloorClamped).unwrap(), "\"FLOOR_CLAMPED\"");
    assert_eq!("skipped_no_data".parse::<ReasonCode>().unwrap(), ReasonCode::SkippedNoData);
    assert!("NOPE".parse::<ReasonCode>().is_err());
}

#[test]
fn test_error_reason_codes() {
    assert!(ReasonCode::CycleAborted.is_error());
    assert!(ReasonCode::UpstreamRejected.is_error());
    assert!(!ReasonCode::SkippedNoData.is_error());
    assert!(!ReasonCode::FloorClamped.is_error());
}

#[test]
fn test_decision_status_follows_reason_and_change() {
    assert_eq!(decision(2000, 1980, ReasonCode::Undercut).status, DecisionStatus::Proposed);
    assert_eq!(decision(2000, 2000, ReasonCode::Holding).status, DecisionStatus::NoChange);
    assert_eq!(decision(2000, 2000, ReasonCode::SkippedNoData).status, DecisionStatus::Skipped);
    assert_eq!(decision(2000, 2000, ReasonCode::ConfigError).status, DecisionStatus::Failed);
}

#[test]
fn test_decision_ids_stable_until_bound_to_run() {
    let now = Utc::now();
    let make = || {
        PriceDecision::unchanged(
            "SKU-1".into(),
            "MP".into(),
            Decimal::ONE,
            None,
            ReasonCode::Holding,
            DecisionContext::new(),
            now,
        )
    };
    assert_eq!(make().id, make().id);

    let bound = make().with_run("run-1");
    assert_eq!(bound.run_id.as_deref(), Some("run-1"));
    assert_ne!(bound.id, make().id);
}

#[test]
fn test_into_failed_restores_old_price() {
    let failed = decision(2000, 1980, ReasonCode::Undercut).into_failed(ReasonCode::UpstreamRejected);
    assert_eq!(failed.new_price, failed.old_price);
    assert_eq!(failed.status, DecisionStatus::Failed);
    assert_eq!(failed.context["attempted"]["new_price"], "19.80");
}

#[test]
fn test_trigger_priority() {
    assert_eq!(TriggerKind::Notification.priority(), Priority::High);
    assert_eq!(TriggerKind::Manual.priority(), Priority::High);
    assert_eq!(TriggerKind::Fallback.priority(), Priority::Low);
    assert!(Priority::High < Priority::Low);
}

#[test]
fn test_alert_kind_parse() {
    assert_eq!("stale_floor_feed".parse::<AlertKind>().unwrap(), AlertKind::StaleFloorFeed);
    assert_eq!(AlertKind::QueueOverflow.to_string(), "QUEUE_OVERFLOW");
}

#[test]
fn test_failure_classes() {
    assert_eq!(UpstreamError::RateLimited("x".into()).class(), FailureClass::RateLimited);
    assert!(FailureClass::Transient.is_retryable());
    assert!(!FailureClass::Permanent.is_retryable());
}

#[test]
fn test_floor_freshness_boundary() {
    let now = Utc::now();
    let floor = FloorRecord {
        floor_price: Decimal::ONE,
        min_business_price: None,
        as_of: now - Duration::minutes(90),
    };
    assert!(floor.is_fresh(now, Duration::minutes(90)));
    assert!(!floor.is_fresh(now, Duration::minutes(89)));
}
