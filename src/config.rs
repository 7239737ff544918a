//! Runtime configuration read from `REPRICER_*` environment variables.
//!
//! Every value has a default matching the service's production setup. Talking
//! to the pricing API additionally needs `REPRICER_API_TOKEN`.

use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use crate::application::retry::RetryPolicy;
use crate::application::scheduler::SchedulerConfig;
use crate::domain::error::DomainError;
use crate::domain::values::execution::ExecutionMode;
use crate::domain::values::guardrail::{self, GuardrailProfile, DEFAULT_PROFILE_NAME};

#[derive(Debug, Clone)]
pub struct PricingApiSettings {
    pub endpoint: String,
    pub access_token: Option<String>,
    /// Our seller id; offers carrying it are ours, not competitors'.
    pub seller_id: String,
    pub min_request_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for PricingApiSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://sellingpartnerapi-eu.amazon.com".into(),
            access_token: None,
            seller_id: "seller".into(),
            min_request_interval: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: String,
    pub scheduler: SchedulerConfig,
    pub pricing_api: PricingApiSettings,
    /// Seeded as the active profile when the store has none.
    pub default_profile: GuardrailProfile,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: "./repricer.db".into(),
            scheduler: SchedulerConfig::default(),
            pricing_api: PricingApiSettings::default(),
            default_profile: GuardrailProfile::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, DomainError> {
        let defaults = Settings::default();
        let sched = &defaults.scheduler;
        let api = &defaults.pricing_api;

        let retry = RetryPolicy::new(
            env_or("REPRICER_RETRY_MAX_ATTEMPTS", sched.retry.max_attempts())?,
            Duration::from_millis(env_or("REPRICER_RETRY_BASE_DELAY_MS", 1_000u64)?),
            Duration::from_millis(env_or("REPRICER_RETRY_MAX_DELAY_MS", 60_000u64)?),
            env_or("REPRICER_RETRY_JITTER", 0.25f64)?,
        )?;

        let execution_mode = match std::env::var("REPRICER_MODE") {
            Ok(v) => v.parse().map_err(DomainError::Config)?,
            Err(_) if env_flag("REPRICER_TEST_MODE") => ExecutionMode::DryRun,
            Err(_) => sched.execution_mode,
        };

        let scheduler = SchedulerConfig {
            max_concurrency: env_or("REPRICER_MAX_CONCURRENCY", sched.max_concurrency)?,
            queue_capacity: env_or("REPRICER_QUEUE_CAPACITY", sched.queue_capacity)?,
            fallback_interval: Duration::from_secs(env_or(
                "REPRICER_FALLBACK_INTERVAL_SECS",
                sched.fallback_interval.as_secs(),
            )?),
            fallback_batch_size: env_or("REPRICER_FALLBACK_BATCH_SIZE", sched.fallback_batch_size)?,
            floor_stale_after: env_minutes(
                "REPRICER_FLOOR_STALE_MINUTES",
                sched.floor_stale_after.num_minutes(),
            )?,
            snapshot_max_age: env_minutes(
                "REPRICER_SNAPSHOT_MAX_AGE_MINUTES",
                sched.snapshot_max_age.num_minutes(),
            )?,
            no_data_alert_after: env_or("REPRICER_NO_DATA_ALERT_AFTER", sched.no_data_alert_after)?,
            rejection_alert_after: env_or("REPRICER_REJECTION_ALERT_AFTER", sched.rejection_alert_after)?,
            alert_throttle: env_minutes(
                "REPRICER_ALERT_THROTTLE_MINUTES",
                sched.alert_throttle.num_minutes(),
            )?,
            execution_mode,
            retry,
        };
        scheduler.validate()?;

        let default_profile = GuardrailProfile::new(
            std::env::var("REPRICER_PROFILE_NAME").unwrap_or_else(|_| DEFAULT_PROFILE_NAME.into()),
            env_or("REPRICER_MAX_PRICE_CHANGE_PERCENT", Decimal::from(20))?,
            env_or("REPRICER_STEP_UP_PERCENT", Decimal::from(2))?,
            env_minutes("REPRICER_STEP_UP_INTERVAL_MINUTES", 360i64)?,
            env_or("REPRICER_MIN_MARGIN_PERCENT", Decimal::ZERO)?,
            env_or("REPRICER_UNDERCUT_PERCENT", Decimal::new(5, 1))?,
        )?;

        let pricing_api = PricingApiSettings {
            endpoint: std::env::var("REPRICER_API_ENDPOINT").unwrap_or_else(|_| api.endpoint.clone()),
            access_token: std::env::var("REPRICER_API_TOKEN").ok(),
            seller_id: std::env::var("REPRICER_SELLER_ID").unwrap_or_else(|_| api.seller_id.clone()),
            min_request_interval: Duration::from_millis(env_or(
                "REPRICER_API_MIN_INTERVAL_MS",
                api.min_request_interval.as_millis() as u64,
            )?),
            request_timeout: Duration::from_secs(env_or(
                "REPRICER_API_TIMEOUT_SECS",
                api.request_timeout.as_secs(),
            )?),
        };

        Ok(Self {
            db_path: std::env::var("REPRICER_DB").unwrap_or(defaults.db_path),
            scheduler,
            pricing_api,
            default_profile,
        })
    }
}

fn env_minutes(key: &str, default: i64) -> Result<chrono::Duration, DomainError> {
    guardrail::minutes(key, env_or(key, default)?)
}

fn env_or<T>(key: &str, default: T) -> Result<T, DomainError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| DomainError::Config(format!("{key}={raw}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
