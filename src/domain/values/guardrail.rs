//! Guardrail profiles: the pricing-policy limits a run is evaluated under.
//!
//! A profile is validated when it is built or deserialized and never changes
//! afterwards. The scheduler hands each run a [`VersionedProfile`] snapshot so
//! that swapping the active profile never affects a cycle already in progress.

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

pub const DEFAULT_PROFILE_NAME: &str = "Default";

/// Upper bound for the change, step-up and undercut percentages.
pub const MAX_CHANGE_PERCENT: Decimal = Decimal::ONE_HUNDRED;
/// Upper bound for `min_margin_percent`.
pub const MAX_MARGIN_PERCENT: Decimal = Decimal::ONE_THOUSAND;

/// Named bundle of pricing-policy limits. All percentages are plain percent
/// values (`2` means 2 %).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawProfile", into = "RawProfile")]
pub struct GuardrailProfile {
    name: String,
    max_price_change_percent: Decimal,
    step_up_percent: Decimal,
    step_up_interval: Duration,
    min_margin_percent: Decimal,
    undercut_percent: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawProfile {
    name: String,
    max_price_change_percent: Decimal,
    step_up_percent: Decimal,
    step_up_interval_minutes: i64,
    #[serde(default)]
    min_margin_percent: Decimal,
    undercut_percent: Decimal,
}

impl TryFrom<RawProfile> for GuardrailProfile {
    type Error = DomainError;

    fn try_from(raw: RawProfile) -> Result<Self, Self::Error> {
        GuardrailProfile::new(
            raw.name,
            raw.max_price_change_percent,
            raw.step_up_percent,
            minutes("step_up_interval_minutes", raw.step_up_interval_minutes)?,
            raw.min_margin_percent,
            raw.undercut_percent,
        )
    }
}

impl From<GuardrailProfile> for RawProfile {
    fn from(p: GuardrailProfile) -> Self {
        RawProfile {
            name: p.name,
            max_price_change_percent: p.max_price_change_percent,
            step_up_percent: p.step_up_percent,
            step_up_interval_minutes: p.step_up_interval.num_minutes(),
            min_margin_percent: p.min_margin_percent,
            undercut_percent: p.undercut_percent,
        }
    }
}

impl GuardrailProfile {
    pub fn new(
        name: impl Into<String>,
        max_price_change_percent: Decimal,
        step_up_percent: Decimal,
        step_up_interval: Duration,
        min_margin_percent: Decimal,
        undercut_percent: Decimal,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::Config("guardrail profile name must not be empty".into()));
        }
        for (field, value) in [
            ("max_price_change_percent", max_price_change_percent),
            ("step_up_percent", step_up_percent),
            ("min_margin_percent", min_margin_percent),
            ("undercut_percent", undercut_percent),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(DomainError::Config(format!(
                    "{field} must be non-negative, got {value}"
                )));
            }
        }
        for (field, value, max) in [
            ("max_price_change_percent", max_price_change_percent, MAX_CHANGE_PERCENT),
            ("step_up_percent", step_up_percent, MAX_CHANGE_PERCENT),
            ("undercut_percent", undercut_percent, MAX_CHANGE_PERCENT),
            ("min_margin_percent", min_margin_percent, MAX_MARGIN_PERCENT),
        ] {
            if value > max {
                return Err(DomainError::Config(format!("{field} must not exceed {max}, got {value}")));
            }
        }
        if step_up_interval <= Duration::zero() {
            return Err(DomainError::Config(format!(
                "step_up_interval must be positive, got {} minutes",
                step_up_interval.num_minutes()
            )));
        }
        Ok(Self {
            name,
            max_price_change_percent,
            step_up_percent,
            step_up_interval,
            min_margin_percent,
            undercut_percent,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_price_change_percent(&self) -> Decimal {
        self.max_price_change_percent
    }

    pub fn step_up_percent(&self) -> Decimal {
        self.step_up_percent
    }

    pub fn step_up_interval(&self) -> Duration {
        self.step_up_interval
    }

    pub fn min_margin_percent(&self) -> Decimal {
        self.min_margin_percent
    }

    pub fn undercut_percent(&self) -> Decimal {
        self.undercut_percent
    }
}

impl Default for GuardrailProfile {
    /// Matches the profile the service seeds on first start.
    fn default() -> Self {
        Self {
            name: DEFAULT_PROFILE_NAME.into(),
            max_price_change_percent: Decimal::from(20),
            step_up_percent: Decimal::from(2),
            step_up_interval: Duration::hours(6),
            min_margin_percent: Decimal::ZERO,
            undercut_percent: Decimal::new(5, 1),
        }
    }
}

/// Whole minutes as a duration, rejecting values outside chrono's range.
pub fn minutes(field: &str, value: i64) -> Result<Duration, DomainError> {
    Duration::try_minutes(value)
        .ok_or_else(|| DomainError::Config(format!("{field} is out of range: {value} minutes")))
}

/// A profile pinned to the registry version it was published under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionedProfile {
    pub version: u64,
    pub profile: GuardrailProfile,
}
