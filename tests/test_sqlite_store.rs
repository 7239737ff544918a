//! SQLite catalog, floor feed and audit trail.

mod common;

use chrono::{Duration, Utc};
use common::*;
use repricer::domain::entities::price_decision::{DecisionContext, PriceDecision};
use repricer::domain::entities::run::{Run, RunCounts, RunStatus};
use repricer::domain::error::DomainError;
use repricer::domain::ports::audit_sink::{AlertSink, AuditSink};
use repricer::domain::ports::catalog::{AppliedPrice, CatalogStore};
use repricer::domain::ports::floor_source::FloorPriceSource;
use repricer::domain::values::alert::{Alert, AlertKind, AlertSeverity};
use repricer::domain::values::floor::FloorRecord;
use repricer::domain::values::reason_code::ReasonCode;
use repricer::domain::values::trigger::TriggerKind;
use repricer::infrastructure::sqlite::audit_repo::{AlertFilter, DecisionFilter, RunFilter};
use repricer::infrastructure::sqlite::SqliteStore;

fn applied(price: &str, stepped_up: bool) -> AppliedPrice {
    AppliedPrice {
        price: d(price),
        business_price: None,
        stepped_up,
        applied_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_upsert_keeps_evaluation_bookkeeping() {
    let store = SqliteStore::in_memory().unwrap();
    store.upsert_sku(&make_sku("SKU-1", "20.00", "15.00")).unwrap();
    store.mark_evaluated(MP, "SKU-1", Utc::now()).await.unwrap();

    let mut updated = make_sku("SKU-1", "21.00", "16.00");
    updated.cost = Some(d("9.50"));
    store.upsert_sku(&updated).unwrap();

    let record = store.get_sku(MP, "SKU-1").await.unwrap().unwrap();
    assert_eq!(record.current_price, d("21.00"));
    assert_eq!(record.floor_price, d("16.00"));
    assert_eq!(record.cost, Some(d("9.50")));
    assert!(record.last_evaluated_at.is_some());
}

#[tokio::test]
async fn test_applied_price_tracks_day_open() {
    let store = SqliteStore::in_memory().unwrap();
    store.upsert_sku(&make_sku("SKU-1", "20.00", "15.00")).unwrap();

    store.record_applied_price(MP, "SKU-1", &applied("19.50", false)).await.unwrap();
    store.record_applied_price(MP, "SKU-1", &applied("19.00", false)).await.unwrap();

    let record = store.get_sku(MP, "SKU-1").await.unwrap().unwrap();
    assert_eq!(record.current_price, d("19.00"));
    assert_eq!(record.day_open_price, Some(d("20.00")));
    assert!(record.last_step_up_at.is_none());

    store.record_applied_price(MP, "SKU-1", &applied("19.38", true)).await.unwrap();
    let record = store.get_sku(MP, "SKU-1").await.unwrap().unwrap();
    assert!(record.last_step_up_at.is_some());
    assert_eq!(record.day_open_price, Some(d("20.00")));
}

#[tokio::test]
async fn test_applied_price_for_unknown_sku() {
    let store = SqliteStore::in_memory().unwrap();
    let result = store.record_applied_price(MP, "GHOST", &applied("1.00", false)).await;
    assert!(matches!(result, Err(DomainError::NotFound(_))));
}

#[tokio::test]
async fn test_least_recently_evaluated_order() {
    let store = SqliteStore::in_memory().unwrap();
    for sku in ["A", "B", "C"] {
        store.upsert_sku(&make_sku(sku, "10.00", "5.00")).unwrap();
    }
    store.mark_evaluated(MP, "B", Utc::now() - Duration::hours(1)).await.unwrap();
    store.mark_evaluated(MP, "C", Utc::now() - Duration::hours(2)).await.unwrap();

    let order: Vec<String> = store
        .least_recently_evaluated(MP, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.sku)
        .collect();
    assert_eq!(order, vec!["A", "C", "B"]);

    assert_eq!(store.least_recently_evaluated(MP, 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_marketplaces_are_distinct() {
    let store = SqliteStore::in_memory().unwrap();
    store.upsert_sku(&make_sku("A", "10.00", "5.00")).unwrap();
    store.upsert_sku(&make_sku("B", "10.00", "5.00")).unwrap();
    let mut other = make_sku("A", "10.00", "5.00");
    other.marketplace = "APJ6JRA9NG5V4".into();
    store.upsert_sku(&other).unwrap();

    assert_eq!(store.marketplaces().await.unwrap(), vec!["A1PA6795UKMFR9", "APJ6JRA9NG5V4"]);
    assert_eq!(store.list_skus(MP).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_floor_feed_mirrors_onto_catalog() {
    let store = SqliteStore::in_memory().unwrap();
    store.upsert_sku(&make_sku("SKU-1", "20.00", "15.00")).unwrap();
    assert!(store.load_floor(MP, "SKU-1").await.unwrap().is_none());

    let as_of = Utc::now() - Duration::minutes(30);
    store
        .set_floor(
            MP,
            "SKU-1",
            &FloorRecord {
                floor_price: d("17.25"),
                min_business_price: Some(d("16.00")),
                as_of,
            },
        )
        .unwrap();

    let floor = store.load_floor(MP, "SKU-1").await.unwrap().unwrap();
    assert_eq!(floor.floor_price, d("17.25"));
    assert_eq!(floor.min_business_price, Some(d("16.00")));
    assert!((floor.as_of - as_of).num_milliseconds().abs() < 1);
    assert!(floor.is_fresh(Utc::now(), Duration::minutes(90)));

    let record = store.get_sku(MP, "SKU-1").await.unwrap().unwrap();
    assert_eq!(record.floor_price, d("17.25"));
}

#[tokio::test]
async fn test_run_and_decision_trail() {
    let store = SqliteStore::in_memory().unwrap();
    let mut run = Run::open(MP.into(), TriggerKind::Notification, "Default".into(), 1);
    store.open_run(&run).await.unwrap();

    let stored = store.get_run(&run.id).unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Running);
    assert!(stored.is_open());

    for (sku, reason) in [("A", ReasonCode::Undercut), ("B", ReasonCode::SkippedNoData)] {
        let decision = PriceDecision::new(
            sku.into(),
            MP.into(),
            d("20.00"),
            d("19.90"),
            None,
            None,
            reason,
            DecisionContext::new(),
            Utc::now(),
        )
        .with_run(&run.id);
        store.record_decision(&decision).await.unwrap();
    }
    run.close(
        RunStatus::Completed,
        RunCounts {
            processed: 2,
            updated: 1,
            errors: 0,
        },
    );
    store.close_run(&run).await.unwrap();

    let stored = store.get_run(&run.id).unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
    assert_eq!(stored.counts.processed, 2);
    assert_eq!(stored.trigger_kind, TriggerKind::Notification);

    let decisions = store
        .list_decisions(&DecisionFilter {
            run_id: Some(run.id.clone()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(decisions.iter().map(|d| d.sku.as_str()).collect::<Vec<_>>(), vec!["A", "B"]);
    assert_eq!(decisions[1].reason_code, ReasonCode::SkippedNoData);
    assert_eq!(decisions[0].new_price, d("19.90"));

    let runs = store
        .list_runs(&RunFilter {
            marketplace: Some("OTHER".into()),
            ..Default::default()
        })
        .unwrap();
    assert!(runs.is_empty());
}

#[tokio::test]
async fn test_close_unknown_run_fails() {
    let store = SqliteStore::in_memory().unwrap();
    let run = Run::open(MP.into(), TriggerKind::Manual, "Default".into(), 1);
    assert!(matches!(store.close_run(&run).await, Err(DomainError::NotFound(_))));
}

#[tokio::test]
async fn test_alert_filter_by_kind() {
    let store = SqliteStore::in_memory().unwrap();
    for kind in [AlertKind::StaleFloorFeed, AlertKind::QueueOverflow, AlertKind::StaleFloorFeed] {
        let alert = Alert::new(kind, AlertSeverity::Warning, "test", serde_json::json!({ "marketplace": MP }));
        store.raise_alert(&alert).await.unwrap();
    }

    let stale = store
        .list_alerts(&AlertFilter {
            kind: Some(AlertKind::StaleFloorFeed),
            limit: None,
        })
        .unwrap();
    assert_eq!(stale.len(), 2);
    assert_eq!(stale[0].details["marketplace"], MP);

    let limited = store
        .list_alerts(&AlertFilter {
            kind: None,
            limit: Some(1),
        })
        .unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn test_file_backed_store_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("repricer.db");
    let path = path.to_str().unwrap();

    {
        let store = SqliteStore::open(path).unwrap();
        store.upsert_sku(&make_sku("SKU-1", "20.00", "15.00")).unwrap();
    }

    let store = SqliteStore::open(path).unwrap();
    let record = store.get_sku(MP, "SKU-1").await.unwrap().unwrap();
    assert_eq!(record.current_price, d("20.00"));
}

#[tokio::test]
async fn test_last_raised_at_by_throttle_key() {
    let store = SqliteStore::in_memory().unwrap();
    assert!(store.last_raised_at("stale_floor:MP").await.unwrap().is_none());

    let alert = Alert::new(
        AlertKind::StaleFloorFeed,
        AlertSeverity::Warning,
        "floor feed is stale",
        serde_json::json!({ "marketplace": MP, "throttle_key": "stale_floor:MP" }),
    );
    store.raise_alert(&alert).await.unwrap();
    let untagged = Alert::new(AlertKind::StaleFloorFeed, AlertSeverity::Warning, "untagged", serde_json::json!({}));
    store.raise_alert(&untagged).await.unwrap();

    let at = store.last_raised_at("stale_floor:MP").await.unwrap().unwrap();
    assert!((at - alert.created_at).num_milliseconds().abs() < 1);
    assert!(store.last_raised_at("stale_floor:OTHER").await.unwrap().is_none());
}

#[tokio::test]
async fn test_runs_filtered_by_trigger_and_start() {
    let store = SqliteStore::in_memory().unwrap();
    let mut early = Run::open(MP.into(), TriggerKind::Manual, "Default".into(), 1);
    early.started_at = Utc::now() - Duration::minutes(5);
    store.open_run(&early).await.unwrap();
    let since = Utc::now() - Duration::minutes(1);
    let manual = Run::open(MP.into(), TriggerKind::Manual, "Default".into(), 1);
    let fallback = Run::open(MP.into(), TriggerKind::Fallback, "Default".into(), 1);
    store.open_run(&manual).await.unwrap();
    store.open_run(&fallback).await.unwrap();

    let runs = store
        .list_runs(&RunFilter {
            trigger_kind: Some(TriggerKind::Manual),
            started_since: Some(since),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, manual.id);
}
