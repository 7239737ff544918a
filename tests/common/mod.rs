//! Shared test helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use repricer::application::retry::RetryPolicy;
use repricer::application::scheduler::SchedulerConfig;
use repricer::config::Settings;
use repricer::domain::entities::sku::SkuRecord;
use repricer::domain::error::UpstreamError;
use repricer::domain::ports::pricing_client::{CompetitivePricingClient, SubmissionAck};
use repricer::domain::values::floor::FloorRecord;
use repricer::domain::values::snapshot::CompetitorSnapshot;
use repricer::Repricer;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const MP: &str = "A1PA6795UKMFR9";

pub fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Retry delays in the low milliseconds so retry scenarios run quickly.
pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        max_concurrency: 4,
        fallback_interval: std::time::Duration::from_secs(3600),
        retry: RetryPolicy::new(
            5,
            std::time::Duration::from_millis(2),
            std::time::Duration::from_millis(50),
            0.25,
        )
        .unwrap(),
        ..SchedulerConfig::default()
    }
}

pub fn setup_with(pricing: Arc<ScriptedPricing>, scheduler: SchedulerConfig) -> Repricer {
    let settings = Settings {
        db_path: ":memory:".into(),
        scheduler,
        ..Settings::default()
    };
    Repricer::with_providers(settings, pricing).unwrap()
}

pub fn setup(pricing: Arc<ScriptedPricing>) -> Repricer {
    setup_with(pricing, fast_config())
}

pub fn make_sku(sku: &str, current: &str, floor: &str) -> SkuRecord {
    SkuRecord {
        sku: sku.into(),
        marketplace: MP.into(),
        current_price: d(current),
        current_business_price: None,
        floor_price: d(floor),
        min_business_price: None,
        cost: None,
        holds_buy_box: false,
        day_open_price: None,
        last_step_up_at: None,
        last_evaluated_at: None,
    }
}

pub fn fresh_floor(floor: &str) -> FloorRecord {
    FloorRecord {
        floor_price: d(floor),
        min_business_price: None,
        as_of: Utc::now(),
    }
}

/// Catalog entry plus a fresh floor record.
pub fn seed(repricer: &Repricer, sku: &str, current: &str, floor: &str) {
    repricer.upsert_sku(&make_sku(sku, current, floor)).unwrap();
    repricer.set_floor(MP, sku, &fresh_floor(floor)).unwrap();
}

pub fn competitor_snapshot(lowest: &str) -> CompetitorSnapshot {
    CompetitorSnapshot {
        lowest_competitor_price: Some(d(lowest)),
        is_buy_box_winner: false,
        buy_box_price: Some(d(lowest)),
        snapshot_time: Utc::now(),
    }
}

pub fn winning_snapshot(buy_box_cap: Option<&str>) -> CompetitorSnapshot {
    CompetitorSnapshot {
        lowest_competitor_price: buy_box_cap.map(d),
        is_buy_box_winner: true,
        buy_box_price: buy_box_cap.map(d),
        snapshot_time: Utc::now(),
    }
}

pub fn hours_ago(hours: i64) -> chrono::DateTime<Utc> {
    Utc::now() - Duration::hours(hours)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub marketplace: String,
    pub sku: String,
    pub price: Decimal,
    pub business_price: Option<Decimal>,
}

/// In-process pricing API driven by per-SKU scripts.
///
/// Scripted errors are returned first, in order; after that the configured
/// snapshot (or a default competitor snapshot) is served.
#[derive(Default)]
pub struct ScriptedPricing {
    snapshots: Mutex<HashMap<String, CompetitorSnapshot>>,
    fetch_errors: Mutex<HashMap<String, VecDeque<UpstreamError>>>,
    submit_errors: Mutex<HashMap<String, VecDeque<UpstreamError>>>,
    connect_error: Mutex<Option<UpstreamError>>,
    submissions: Mutex<Vec<Submission>>,
    fetch_calls: Mutex<HashMap<String, usize>>,
    latency: Mutex<Option<std::time::Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedPricing {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_snapshot(&self, sku: &str, snapshot: CompetitorSnapshot) {
        self.snapshots.lock().unwrap().insert(sku.into(), snapshot);
    }

    pub fn fail_fetch(&self, sku: &str, errors: Vec<UpstreamError>) {
        self.fetch_errors.lock().unwrap().insert(sku.into(), errors.into());
    }

    pub fn fail_submit(&self, sku: &str, errors: Vec<UpstreamError>) {
        self.submit_errors.lock().unwrap().insert(sku.into(), errors.into());
    }

    pub fn fail_connect(&self, error: UpstreamError) {
        *self.connect_error.lock().unwrap() = Some(error);
    }

    pub fn set_latency(&self, latency: std::time::Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self, sku: &str) -> usize {
        self.fetch_calls.lock().unwrap().get(sku).copied().unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_error(queue: &Mutex<HashMap<String, VecDeque<UpstreamError>>>, sku: &str) -> Option<UpstreamError> {
        queue.lock().unwrap().get_mut(sku).and_then(|q| q.pop_front())
    }
}

#[async_trait]
impl CompetitivePricingClient for ScriptedPricing {
    async fn connect(&self, _marketplace: &str) -> Result<(), UpstreamError> {
        match self.connect_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn fetch_snapshot(&self, _marketplace: &str, sku: &str) -> Result<CompetitorSnapshot, UpstreamError> {
        *self.fetch_calls.lock().unwrap().entry(sku.into()).or_insert(0) += 1;
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(e) = Self::next_error(&self.fetch_errors, sku) {
            return Err(e);
        }
        let snapshot = self.snapshots.lock().unwrap().get(sku).cloned();
        Ok(match snapshot {
            Some(s) => CompetitorSnapshot {
                snapshot_time: Utc::now(),
                ..s
            },
            None => competitor_snapshot("20.00"),
        })
    }

    async fn submit_price(
        &self,
        marketplace: &str,
        sku: &str,
        new_price: Decimal,
        new_business_price: Option<Decimal>,
    ) -> Result<SubmissionAck, UpstreamError> {
        if let Some(e) = Self::next_error(&self.submit_errors, sku) {
            return Err(e);
        }
        self.submissions.lock().unwrap().push(Submission {
            marketplace: marketplace.into(),
            sku: sku.into(),
            price: new_price,
            business_price: new_business_price,
        });
        Ok(SubmissionAck {
            reference: Some(format!("sub-{sku}")),
            payload: serde_json::json!({ "status": "ACCEPTED" }),
        })
    }
}
