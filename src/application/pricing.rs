//! Pricing decision engine.
//!
//! [`PricingEngine::decide`] is a pure function of its [`EvaluationInput`]:
//! the same SKU record, snapshot, profile and evaluation instant always yield
//! the same [`PriceDecision`]. That is what makes retried or re-notified
//! evaluations safe to repeat.
//!
//! # Branches
//!
//! Exactly one branch is taken per evaluation, chosen from the snapshot fetched
//! for it (the catalog's `holds_buy_box` flag is informational only):
//!
//! - [`Branch::NoData`]: no snapshot, a stale snapshot, or no competitor price
//!   to undercut. Produces `SKIPPED_NO_DATA` and never touches the price.
//! - [`Branch::HoldingBuyBox`]: we own the Buy Box. Step the price up when the
//!   step-up interval has elapsed, otherwise hold.
//! - [`Branch::Undercutting`]: someone else owns the Buy Box. Undercut the
//!   lowest competitor, clamped by the floor, the margin policy and the
//!   per-run change bound.
//!
//! Whatever the branch, a non-skip decision never lists below `floor_price`.
//! All prices are rounded to cents.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::json;

use crate::domain::entities::price_decision::{DecisionContext, PriceDecision};
use crate::domain::entities::sku::SkuRecord;
use crate::domain::error::DomainError;
use crate::domain::values::guardrail::GuardrailProfile;
use crate::domain::values::reason_code::ReasonCode;
use crate::domain::values::snapshot::CompetitorSnapshot;

/// Default bound after which a competitor snapshot no longer counts as data.
pub const DEFAULT_SNAPSHOT_MAX_AGE_MINUTES: i64 = 15;

/// Everything one evaluation depends on.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub sku: &'a SkuRecord,
    pub snapshot: Option<&'a CompetitorSnapshot>,
    pub profile: &'a GuardrailProfile,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PricingEngine {
    snapshot_max_age: Duration,
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_SNAPSHOT_MAX_AGE_MINUTES))
    }
}

/// The closed set of decision paths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Branch<'a> {
    NoData { cause: &'static str },
    HoldingBuyBox { snapshot: &'a CompetitorSnapshot },
    Undercutting { snapshot: &'a CompetitorSnapshot, lowest: Decimal },
}

impl PricingEngine {
    pub fn new(snapshot_max_age: Duration) -> Self {
        Self { snapshot_max_age }
    }

    pub fn snapshot_max_age(&self) -> Duration {
        self.snapshot_max_age
    }

    /// Evaluate one SKU. Returns `DomainError::Config` for records that must
    /// not be priced at all (non-positive floor or current price).
    pub fn decide(&self, input: &EvaluationInput<'_>) -> Result<PriceDecision, DomainError> {
        validate_record(input.sku)?;
        let mut ctx = base_context(input);

        let decision = match self.select_branch(input) {
            Branch::NoData { cause } => {
                ctx.insert("branch".into(), json!("no_data"));
                ctx.insert("no_data_cause".into(), json!(cause));
                unchanged(input, ReasonCode::SkippedNoData, ctx)
            }
            Branch::HoldingBuyBox { snapshot } => {
                ctx.insert("branch".into(), json!("holding_buy_box"));
                hold_or_step_up(input, snapshot, ctx)?
            }
            Branch::Undercutting { snapshot, lowest } => {
                ctx.insert("branch".into(), json!("undercutting"));
                undercut(input, snapshot, lowest, ctx)?
            }
        };
        Ok(decision)
    }

    /// The record checks `decide` runs first, exposed so callers can reject a
    /// record before spending an upstream call on it.
    pub fn validate(&self, sku: &SkuRecord) -> Result<(), DomainError> {
        validate_record(sku)
    }

    pub fn select_branch<'a>(&self, input: &EvaluationInput<'a>) -> Branch<'a> {
        let Some(snapshot) = input.snapshot else {
            return Branch::NoData { cause: "missing_snapshot" };
        };
        if snapshot.is_stale(input.now, self.snapshot_max_age) {
            return Branch::NoData { cause: "stale_snapshot" };
        }
        if snapshot.is_buy_box_winner {
            return Branch::HoldingBuyBox { snapshot };
        }
        match snapshot.lowest_competitor_price {
            Some(lowest) if lowest > Decimal::ZERO => Branch::Undercutting { snapshot, lowest },
            _ => Branch::NoData { cause: "no_competitor_price" },
        }
    }
}

fn validate_record(sku: &SkuRecord) -> Result<(), DomainError> {
    if sku.floor_price <= Decimal::ZERO {
        return Err(DomainError::Config(format!(
            "floor price for {}/{} must be positive, got {}",
            sku.marketplace, sku.sku, sku.floor_price
        )));
    }
    if sku.current_price <= Decimal::ZERO {
        return Err(DomainError::Config(format!(
            "current price for {}/{} must be positive, got {}",
            sku.marketplace, sku.sku, sku.current_price
        )));
    }
    if let Some(min_business) = sku.min_business_price {
        if min_business <= Decimal::ZERO {
            return Err(DomainError::Config(format!(
                "minimum business price for {}/{} must be positive, got {min_business}",
                sku.marketplace, sku.sku
            )));
        }
    }
    if let Some(cost) = sku.cost {
        if cost.is_sign_negative() && !cost.is_zero() {
            return Err(DomainError::Config(format!(
                "cost for {}/{} must not be negative, got {cost}",
                sku.marketplace, sku.sku
            )));
        }
    }
    Ok(())
}

fn hold_or_step_up(
    input: &EvaluationInput<'_>,
    snapshot: &CompetitorSnapshot,
    mut ctx: DecisionContext,
) -> Result<PriceDecision, DomainError> {
    let sku = input.sku;
    let profile = input.profile;
    let current = sku.current_price;

    let due = match sku.last_step_up_at {
        None => true,
        Some(at) => input.now - at >= profile.step_up_interval(),
    };
    ctx.insert("step_up_due".into(), json!(due));
    if let Some(at) = sku.last_step_up_at {
        ctx.insert("last_step_up_at".into(), json!(at.to_rfc3339()));
    }
    if !due {
        return enforce_floor(input, current, ReasonCode::Holding, ctx);
    }

    let raised = to_cents(scale(current, profile.step_up_percent(), "step-up price")?);
    ctx.insert("step_up_candidate".into(), dec(raised));

    let max_change = profile.max_price_change_percent();
    let mut target = raised;
    let mut binding = "step_up_percent";

    if let Some(cap) = snapshot.buy_box_price.or(snapshot.lowest_competitor_price) {
        ctx.insert("buy_box_cap".into(), dec(cap));
        if cap < target {
            target = cap;
            binding = "buy_box_price";
        }
    }
    let day_cap = floor_cents(scale(sku.day_open_or_current(), max_change, "daily cap")?);
    ctx.insert("daily_cap".into(), dec(day_cap));
    if day_cap < target {
        target = day_cap;
        binding = "daily_change_limit";
    }
    let band_hi = floor_cents(scale(current, max_change, "change bound")?);
    if band_hi < target {
        target = band_hi;
        binding = "run_change_limit";
    }
    ctx.insert("binding_cap".into(), json!(binding));

    if target <= current {
        return enforce_floor(input, current, ReasonCode::Holding, ctx);
    }
    enforce_floor(input, target, ReasonCode::StepUp, ctx)
}

fn undercut(
    input: &EvaluationInput<'_>,
    _snapshot: &CompetitorSnapshot,
    lowest: Decimal,
    mut ctx: DecisionContext,
) -> Result<PriceDecision, DomainError> {
    let sku = input.sku;
    let profile = input.profile;
    let current = sku.current_price;

    let candidate = to_cents(scale(lowest, -profile.undercut_percent(), "undercut price")?);
    ctx.insert("candidate_price".into(), dec(candidate));

    let margin_floor = match sku.cost {
        Some(cost) => Some(ceil_cents(scale(cost, profile.min_margin_percent(), "margin floor")?)),
        None => None,
    };
    let effective_floor = match margin_floor {
        Some(m) => m.max(sku.floor_price),
        None => sku.floor_price,
    };
    if let Some(m) = margin_floor {
        ctx.insert("margin_floor".into(), dec(m));
    }
    ctx.insert("effective_floor".into(), dec(effective_floor));

    let floor_hit = candidate < effective_floor || lowest <= sku.floor_price;
    let clamped = candidate.max(effective_floor);

    let (bounded, capped) = bound_change(clamped, current, profile.max_price_change_percent())?;
    ctx.insert("change_capped".into(), json!(capped));

    let reason = if floor_hit {
        ReasonCode::FloorClamped
    } else if bounded == current {
        ReasonCode::AlreadyOptimal
    } else {
        ReasonCode::Undercut
    };
    enforce_floor(input, bounded, reason, ctx)
}

/// Clamp `candidate` to within `max_change_percent` of `current`, on cent
/// boundaries that stay inside the band.
fn bound_change(
    candidate: Decimal,
    current: Decimal,
    max_change_percent: Decimal,
) -> Result<(Decimal, bool), DomainError> {
    let lo = ceil_cents(scale(current, -max_change_percent, "change bound")?).max(Decimal::ZERO);
    let hi = floor_cents(scale(current, max_change_percent, "change bound")?);
    if lo > hi {
        return Ok((current, candidate != current));
    }
    Ok(if candidate < lo {
        (lo, true)
    } else if candidate > hi {
        (hi, true)
    } else {
        (candidate, false)
    })
}

/// Final step of every pricing branch: the hard floor wins over everything,
/// including the change bound.
fn enforce_floor(
    input: &EvaluationInput<'_>,
    price: Decimal,
    reason: ReasonCode,
    mut ctx: DecisionContext,
) -> Result<PriceDecision, DomainError> {
    let sku = input.sku;
    let (new_price, reason) = if price < sku.floor_price {
        ctx.insert("floor_enforced".into(), json!(true));
        (sku.floor_price, ReasonCode::FloorClamped)
    } else {
        (price, reason)
    };
    let new_business = business_price(sku, new_price)?;
    Ok(PriceDecision::new(
        sku.sku.clone(),
        sku.marketplace.clone(),
        sku.current_price,
        new_price,
        sku.current_business_price,
        new_business,
        reason,
        ctx,
        input.now,
    ))
}

/// Apply the listed-price delta to the business price, then clamp it to its
/// own floor.
fn business_price(sku: &SkuRecord, new_price: Decimal) -> Result<Option<Decimal>, DomainError> {
    let Some(old) = sku.current_business_price else {
        return Ok(None);
    };
    let scaled = if new_price == sku.current_price {
        old
    } else {
        let ratio = old
            .checked_mul(new_price)
            .and_then(|v| v.checked_div(sku.current_price))
            .ok_or_else(|| {
                DomainError::Config(format!(
                    "business price for {}/{} overflows when scaled to {new_price}",
                    sku.marketplace, sku.sku
                ))
            })?;
        to_cents(ratio)
    };
    Ok(Some(match sku.min_business_price {
        Some(min) => scaled.max(min),
        None => scaled,
    }))
}

fn unchanged(input: &EvaluationInput<'_>, reason: ReasonCode, ctx: DecisionContext) -> PriceDecision {
    PriceDecision::unchanged(
        input.sku.sku.clone(),
        input.sku.marketplace.clone(),
        input.sku.current_price,
        input.sku.current_business_price,
        reason,
        ctx,
        input.now,
    )
}

fn base_context(input: &EvaluationInput<'_>) -> DecisionContext {
    let sku = input.sku;
    let profile = input.profile;
    let mut ctx = DecisionContext::new();
    ctx.insert("current_price".into(), dec(sku.current_price));
    ctx.insert("floor_price".into(), dec(sku.floor_price));
    ctx.insert("catalog_holds_buy_box".into(), json!(sku.holds_buy_box));
    if let Some(p) = sku.current_business_price {
        ctx.insert("current_business_price".into(), dec(p));
    }
    if let Some(p) = sku.min_business_price {
        ctx.insert("min_business_price".into(), dec(p));
    }
    if let Some(c) = sku.cost {
        ctx.insert("cost".into(), dec(c));
    }
    ctx.insert(
        "profile".into(),
        json!({
            "name": profile.name(),
            "max_price_change_percent": profile.max_price_change_percent().to_string(),
            "step_up_percent": profile.step_up_percent().to_string(),
            "step_up_interval_minutes": profile.step_up_interval().num_minutes(),
            "min_margin_percent": profile.min_margin_percent().to_string(),
            "undercut_percent": profile.undercut_percent().to_string(),
        }),
    );
    if let Some(snapshot) = input.snapshot {
        ctx.insert(
            "snapshot".into(),
            json!({
                "lowest_competitor_price": snapshot.lowest_competitor_price.map(|p| p.to_string()),
                "buy_box_price": snapshot.buy_box_price.map(|p| p.to_string()),
                "is_buy_box_winner": snapshot.is_buy_box_winner,
                "age_secs": snapshot.age_at(input.now).num_seconds(),
            }),
        );
    }
    ctx
}

fn percent(value: Decimal) -> Decimal {
    value / Decimal::ONE_HUNDRED
}

/// `value` moved by `pct` percent. Leaving the decimal range is a config
/// error, never a panic.
fn scale(value: Decimal, pct: Decimal, what: &str) -> Result<Decimal, DomainError> {
    Decimal::ONE
        .checked_add(percent(pct))
        .and_then(|factor| value.checked_mul(factor))
        .ok_or_else(|| DomainError::Config(format!("{what} overflows: {value} moved by {pct}%")))
}

fn to_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn ceil_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::ToPositiveInfinity)
}

fn floor_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::ToNegativeInfinity)
}

fn dec(value: Decimal) -> serde_json::Value {
    json!(value.to_string())
}
