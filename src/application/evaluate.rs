//! Per-SKU evaluation pipeline run by the scheduler's workers.
//!
//! load SKU → load floor → validate → fetch snapshot → decide → submit →
//! record decision → mark evaluated. Every path ends in exactly one recorded
//! decision; only storage failures surface as `Err`.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::application::alerts::AlertDispatcher;
use crate::application::pricing::{EvaluationInput, PricingEngine};
use crate::application::retry::{with_retry, RetryFailure, RetryPolicy};
use crate::application::work_queue::WorkItem;
use crate::domain::entities::price_decision::{DecisionContext, DecisionStatus, PriceDecision};
use crate::domain::entities::sku::{SkuKey, SkuRecord};
use crate::domain::error::DomainError;
use crate::domain::ports::audit_sink::AuditSink;
use crate::domain::ports::catalog::{AppliedPrice, CatalogStore};
use crate::domain::ports::floor_source::FloorPriceSource;
use crate::domain::ports::pricing_client::CompetitivePricingClient;
use crate::domain::values::alert::{AlertKind, AlertSeverity};
use crate::domain::values::execution::ExecutionMode;
use crate::domain::values::guardrail::GuardrailProfile;
use crate::domain::values::reason_code::ReasonCode;

/// Thresholds and modes the pipeline needs beyond the engine itself.
#[derive(Debug, Clone)]
pub struct EvaluationPolicy {
    pub execution_mode: ExecutionMode,
    pub retry: RetryPolicy,
    pub floor_stale_after: Duration,
    pub no_data_alert_after: u32,
    pub rejection_alert_after: u32,
}

pub struct Evaluator {
    catalog: Arc<dyn CatalogStore>,
    floors: Arc<dyn FloorPriceSource>,
    pricing: Arc<dyn CompetitivePricingClient>,
    audit: Arc<dyn AuditSink>,
    alerts: Arc<AlertDispatcher>,
    engine: PricingEngine,
    policy: EvaluationPolicy,
}

enum FloorCheck {
    Usable(SkuRecord),
    Skip(PriceDecision),
}

impl Evaluator {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        floors: Arc<dyn FloorPriceSource>,
        pricing: Arc<dyn CompetitivePricingClient>,
        audit: Arc<dyn AuditSink>,
        alerts: Arc<AlertDispatcher>,
        engine: PricingEngine,
        policy: EvaluationPolicy,
    ) -> Self {
        Self {
            catalog,
            floors,
            pricing,
            audit,
            alerts,
            engine,
            policy,
        }
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.policy.execution_mode
    }

    /// Evaluate one queued SKU inside run `run_id` and record the decision.
    pub async fn evaluate(
        &self,
        run_id: &str,
        marketplace: &str,
        profile: &GuardrailProfile,
        item: &WorkItem,
    ) -> Result<PriceDecision, DomainError> {
        let now = Utc::now();
        let key = SkuKey::new(marketplace, item.sku.as_str());

        let Some(record) = self.catalog.get_sku(marketplace, &item.sku).await? else {
            warn!(sku = %key, "SKU not in catalog");
            let mut ctx = DecisionContext::new();
            ctx.insert("error".into(), json!("sku not found in catalog"));
            let decision = PriceDecision::unchanged(
                item.sku.clone(),
                marketplace.to_string(),
                Decimal::ZERO,
                None,
                ReasonCode::ConfigError,
                ctx,
                now,
            );
            return self.record(run_id, item, decision).await;
        };

        let decision = self.decide(&key, record, profile, now).await?;
        let decision = self.apply(&key, decision, now).await;
        self.track_no_data(&key, &decision).await;

        let decision = self.record(run_id, item, decision).await?;
        self.catalog.mark_evaluated(marketplace, &item.sku, now).await?;
        Ok(decision)
    }

    /// Compute a decision for one SKU without submitting or recording it.
    pub async fn preview(
        &self,
        marketplace: &str,
        sku: &str,
        profile: &GuardrailProfile,
    ) -> Result<PriceDecision, DomainError> {
        let now = Utc::now();
        let key = SkuKey::new(marketplace, sku);
        let record = self
            .catalog
            .get_sku(marketplace, sku)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("SKU {key}")))?;
        self.decide(&key, record, profile, now).await
    }

    async fn decide(
        &self,
        key: &SkuKey,
        record: SkuRecord,
        profile: &GuardrailProfile,
        now: DateTime<Utc>,
    ) -> Result<PriceDecision, DomainError> {
        let record = match self.check_floor(key, record, now).await? {
            FloorCheck::Usable(record) => record,
            FloorCheck::Skip(decision) => return Ok(decision),
        };

        if let Err(e) = self.engine.validate(&record) {
            warn!(sku = %key, "rejecting record: {e}");
            return Ok(config_error(&record, &e, now));
        }

        let fetched = with_retry(&self.policy.retry, "fetch_snapshot", || {
            self.pricing.fetch_snapshot(&key.marketplace, &key.sku)
        })
        .await;
        let (snapshot, fetch_retries) = match fetched {
            Ok(r) => (r.value, r.retries),
            Err(failure) => return Ok(self.fetch_failed(key, &record, failure, now).await),
        };

        let input = EvaluationInput {
            sku: &record,
            snapshot: Some(&snapshot),
            profile,
            now,
        };
        let decision = match self.engine.decide(&input) {
            Ok(d) => d,
            Err(e) => config_error(&record, &e, now),
        };
        Ok(if fetch_retries.is_empty() {
            decision
        } else {
            decision.with_context("fetch_retries", json!(fetch_retries))
        })
    }

    async fn check_floor(
        &self,
        key: &SkuKey,
        record: SkuRecord,
        now: DateTime<Utc>,
    ) -> Result<FloorCheck, DomainError> {
        let floor = self.floors.load_floor(&key.marketplace, &key.sku).await?;
        let Some(floor) = floor else {
            self.alerts
                .raise_throttled(
                    &format!("missing_floor:{key}"),
                    AlertKind::MissingFloor,
                    AlertSeverity::Warning,
                    format!("no floor price for {key}"),
                    json!({ "marketplace": key.marketplace, "sku": key.sku }),
                )
                .await;
            return Ok(FloorCheck::Skip(no_data(&record, "missing_floor", now)));
        };
        if !floor.is_fresh(now, self.policy.floor_stale_after) {
            let age_minutes = (now - floor.as_of).num_minutes();
            self.alerts
                .raise_throttled(
                    &format!("stale_floor:{}", key.marketplace),
                    AlertKind::StaleFloorFeed,
                    AlertSeverity::Warning,
                    format!("floor feed for {} is {age_minutes} minutes old", key.marketplace),
                    json!({
                        "marketplace": key.marketplace,
                        "sku": key.sku,
                        "as_of": floor.as_of.to_rfc3339(),
                        "age_minutes": age_minutes,
                    }),
                )
                .await;
            let decision = no_data(&record, "stale_floor", now)
                .with_context("floor_as_of", json!(floor.as_of.to_rfc3339()));
            return Ok(FloorCheck::Skip(decision));
        }
        Ok(FloorCheck::Usable(record.with_floor(&floor)))
    }

    async fn fetch_failed(
        &self,
        key: &SkuKey,
        record: &SkuRecord,
        failure: RetryFailure,
        now: DateTime<Utc>,
    ) -> PriceDecision {
        let reason = if failure.exhausted {
            ReasonCode::RetriesExhausted
        } else {
            ReasonCode::UpstreamRejected
        };
        let mut ctx = DecisionContext::new();
        ctx.insert("stage".into(), json!("fetch_snapshot"));
        ctx.insert("error".into(), json!(failure.error.message()));
        ctx.insert("failure_class".into(), json!(failure.error.class()));
        ctx.insert("attempts".into(), json!(failure.attempts()));
        ctx.insert("retries".into(), json!(failure.retries));
        let decision = PriceDecision::unchanged(
            record.sku.clone(),
            record.marketplace.clone(),
            record.current_price,
            record.current_business_price,
            reason,
            ctx,
            now,
        );
        self.upstream_failed(key, &failure, "fetch_snapshot").await;
        decision
    }

    /// Submit a proposed change, or mark it as a dry run.
    async fn apply(&self, key: &SkuKey, decision: PriceDecision, now: DateTime<Utc>) -> PriceDecision {
        if decision.status != DecisionStatus::Proposed {
            if !decision.is_skip() {
                self.alerts.streak(&rejection_key(key), false);
            }
            return decision;
        }
        if !self.policy.execution_mode.submits() {
            debug!(sku = %key, new_price = %decision.new_price, "dry run, not submitting");
            return decision.with_status(DecisionStatus::DryRun);
        }

        let submitted = with_retry(&self.policy.retry, "submit_price", || {
            self.pricing.submit_price(
                &key.marketplace,
                &key.sku,
                decision.new_price,
                decision.new_business_price,
            )
        })
        .await;

        match submitted {
            Ok(ack) => {
                self.alerts.streak(&rejection_key(key), false);
                let applied = AppliedPrice {
                    price: decision.new_price,
                    business_price: decision.new_business_price,
                    stepped_up: decision.reason_code == ReasonCode::StepUp,
                    applied_at: now,
                };
                let mut decision = decision
                    .with_status(DecisionStatus::Applied)
                    .with_context("submission", json!(ack.value));
                if !ack.retries.is_empty() {
                    decision = decision.with_context("submit_retries", json!(ack.retries));
                }
                if let Err(e) = self
                    .catalog
                    .record_applied_price(&key.marketplace, &key.sku, &applied)
                    .await
                {
                    error!(sku = %key, "price applied upstream but catalog update failed: {e}");
                    decision = decision.with_context("catalog_update_error", json!(e.to_string()));
                }
                decision
            }
            Err(failure) => {
                let reason = if failure.exhausted {
                    ReasonCode::RetriesExhausted
                } else {
                    ReasonCode::UpstreamRejected
                };
                self.upstream_failed(key, &failure, "submit_price").await;
                decision
                    .into_failed(reason)
                    .with_context("stage", json!("submit_price"))
                    .with_context("error", json!(failure.error.message()))
                    .with_context("failure_class", json!(failure.error.class()))
                    .with_context("attempts", json!(failure.attempts()))
                    .with_context("retries", json!(failure.retries))
            }
        }
    }

    async fn upstream_failed(&self, key: &SkuKey, failure: &RetryFailure, stage: &str) {
        if failure.exhausted {
            warn!(sku = %key, stage, attempts = failure.attempts(), "retries exhausted: {}", failure.error);
            self.alerts
                .raise_throttled(
                    &format!("retries_exhausted:{}", key.marketplace),
                    AlertKind::RetriesExhausted,
                    AlertSeverity::Warning,
                    format!("{stage} for {key} failed after {} attempts", failure.attempts()),
                    json!({
                        "marketplace": key.marketplace,
                        "sku": key.sku,
                        "stage": stage,
                        "class": failure.error.class(),
                        "error": failure.error.message(),
                    }),
                )
                .await;
            return;
        }

        warn!(sku = %key, stage, "upstream rejected request: {}", failure.error);
        let streak = self.alerts.streak(&rejection_key(key), true);
        if streak >= self.policy.rejection_alert_after {
            self.alerts
                .raise_throttled(
                    &rejection_key(key),
                    AlertKind::RecurringRejection,
                    AlertSeverity::Warning,
                    format!("{key} rejected {streak} times in a row"),
                    json!({
                        "marketplace": key.marketplace,
                        "sku": key.sku,
                        "stage": stage,
                        "consecutive": streak,
                        "error": failure.error.message(),
                    }),
                )
                .await;
        }
    }

    async fn track_no_data(&self, key: &SkuKey, decision: &PriceDecision) {
        let no_data_key = format!("no_data:{key}");
        let hit = decision.reason_code == ReasonCode::SkippedNoData;
        let streak = self.alerts.streak(&no_data_key, hit);
        if hit && streak >= self.policy.no_data_alert_after {
            self.alerts
                .raise_throttled(
                    &no_data_key,
                    AlertKind::PersistentNoData,
                    AlertSeverity::Info,
                    format!("{key} has had no usable pricing data for {streak} evaluations"),
                    json!({
                        "marketplace": key.marketplace,
                        "sku": key.sku,
                        "consecutive": streak,
                        "cause": decision.context.get("no_data_cause"),
                    }),
                )
                .await;
        }
    }

    async fn record(
        &self,
        run_id: &str,
        item: &WorkItem,
        decision: PriceDecision,
    ) -> Result<PriceDecision, DomainError> {
        let decision = decision
            .with_context("trigger", json!(item.trigger.to_string()))
            .with_run(run_id);
        self.audit.record_decision(&decision).await?;
        info!(
            run_id,
            marketplace = %decision.marketplace,
            sku = %decision.sku,
            reason = %decision.reason_code,
            status = %decision.status,
            old_price = %decision.old_price,
            new_price = %decision.new_price,
            "decision recorded"
        );
        Ok(decision)
    }
}

fn rejection_key(key: &SkuKey) -> String {
    format!("rejection:{key}")
}

fn no_data(record: &SkuRecord, cause: &str, now: DateTime<Utc>) -> PriceDecision {
    let mut ctx = DecisionContext::new();
    ctx.insert("branch".into(), json!("no_data"));
    ctx.insert("no_data_cause".into(), json!(cause));
    PriceDecision::unchanged(
        record.sku.clone(),
        record.marketplace.clone(),
        record.current_price,
        record.current_business_price,
        ReasonCode::SkippedNoData,
        ctx,
        now,
    )
}

fn config_error(record: &SkuRecord, error: &DomainError, now: DateTime<Utc>) -> PriceDecision {
    let mut ctx = DecisionContext::new();
    ctx.insert("error".into(), json!(error.to_string()));
    PriceDecision::unchanged(
        record.sku.clone(),
        record.marketplace.clone(),
        record.current_price,
        record.current_business_price,
        ReasonCode::ConfigError,
        ctx,
        now,
    )
}

/// Decision recorded for a SKU that was pending when its cycle aborted.
pub fn cycle_aborted(
    marketplace: &str,
    item: &WorkItem,
    record: Option<&SkuRecord>,
    cause: &str,
    now: DateTime<Utc>,
) -> PriceDecision {
    let mut ctx = DecisionContext::new();
    ctx.insert("error".into(), json!(cause));
    ctx.insert("trigger".into(), json!(item.trigger.to_string()));
    PriceDecision::unchanged(
        item.sku.clone(),
        marketplace.to_string(),
        record.map(|r| r.current_price).unwrap_or(Decimal::ZERO),
        record.and_then(|r| r.current_business_price),
        ReasonCode::CycleAborted,
        ctx,
        now,
    )
}
