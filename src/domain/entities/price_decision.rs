use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::values::reason_code::ReasonCode;

/// Ordered key/value pairs attached to a decision for the audit trail.
pub type DecisionContext = BTreeMap<String, serde_json::Value>;

/// Lifecycle of a decision once the scheduler has acted on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// Engine output with a price change not yet acted upon.
    Proposed,
    Applied,
    DryRun,
    NoChange,
    Skipped,
    Failed,
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionStatus::Proposed => "proposed",
            DecisionStatus::Applied => "applied",
            DecisionStatus::DryRun => "dry_run",
            DecisionStatus::NoChange => "no_change",
            DecisionStatus::Skipped => "skipped",
            DecisionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for DecisionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposed" => Ok(DecisionStatus::Proposed),
            "applied" => Ok(DecisionStatus::Applied),
            "dry_run" => Ok(DecisionStatus::DryRun),
            "no_change" => Ok(DecisionStatus::NoChange),
            "skipped" => Ok(DecisionStatus::Skipped),
            "failed" => Ok(DecisionStatus::Failed),
            _ => Err(format!("Unknown decision status: {s}")),
        }
    }
}

/// Outcome of evaluating one SKU in one run. Built once; the `with_*`
/// methods consume the value and return a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceDecision {
    pub id: String,
    pub run_id: Option<String>,
    pub sku: String,
    pub marketplace: String,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub old_business_price: Option<Decimal>,
    pub new_business_price: Option<Decimal>,
    pub reason_code: ReasonCode,
    pub status: DecisionStatus,
    pub context: DecisionContext,
    pub decided_at: DateTime<Utc>,
}

impl PriceDecision {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sku: String,
        marketplace: String,
        old_price: Decimal,
        new_price: Decimal,
        old_business_price: Option<Decimal>,
        new_business_price: Option<Decimal>,
        reason_code: ReasonCode,
        context: DecisionContext,
        decided_at: DateTime<Utc>,
    ) -> Self {
        let changed = new_price != old_price || new_business_price != old_business_price;
        let status = if reason_code.is_error() {
            DecisionStatus::Failed
        } else if reason_code == ReasonCode::SkippedNoData {
            DecisionStatus::Skipped
        } else if changed {
            DecisionStatus::Proposed
        } else {
            DecisionStatus::NoChange
        };
        Self {
            id: deterministic_id(&marketplace, &sku, decided_at),
            run_id: None,
            sku,
            marketplace,
            old_price,
            new_price,
            old_business_price,
            new_business_price,
            reason_code,
            status,
            context,
            decided_at,
        }
    }

    /// A decision that leaves prices untouched.
    pub fn unchanged(
        sku: String,
        marketplace: String,
        old_price: Decimal,
        old_business_price: Option<Decimal>,
        reason_code: ReasonCode,
        context: DecisionContext,
        decided_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            sku,
            marketplace,
            old_price,
            old_price,
            old_business_price,
            old_business_price,
            reason_code,
            context,
            decided_at,
        )
    }

    /// True when the decision proposes a new listed or business price.
    pub fn is_change(&self) -> bool {
        self.new_price != self.old_price || self.new_business_price != self.old_business_price
    }

    pub fn is_skip(&self) -> bool {
        matches!(self.status, DecisionStatus::Skipped | DecisionStatus::Failed)
    }

    pub fn with_run(self, run_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            run_id: Some(run_id.to_string()),
            ..self
        }
    }

    pub fn with_status(self, status: DecisionStatus) -> Self {
        Self { status, ..self }
    }

    pub fn with_context(mut self, key: &str, value: serde_json::Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    /// Turn a proposal into a failed decision, keeping the attempted prices
    /// in the context.
    pub fn into_failed(self, reason_code: ReasonCode) -> Self {
        let attempted = serde_json::json!({
            "new_price": self.new_price.to_string(),
            "new_business_price": self.new_business_price.map(|p| p.to_string()),
            "proposed_reason": self.reason_code.as_str(),
        });
        let mut context = self.context;
        context.insert("attempted".into(), attempted);
        Self {
            new_price: self.old_price,
            new_business_price: self.old_business_price,
            reason_code,
            status: DecisionStatus::Failed,
            context,
            ..self
        }
    }
}

/// Decisions built from identical inputs carry identical ids until they are
/// bound to a run.
fn deterministic_id(marketplace: &str, sku: &str, decided_at: DateTime<Utc>) -> String {
    format!("{marketplace}:{sku}:{}", decided_at.timestamp_millis())
}
