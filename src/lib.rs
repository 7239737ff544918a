pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

use crate::application::alerts::AlertDispatcher;
use crate::application::profiles::ProfileRegistry;
use crate::application::scheduler::{build_evaluator, Scheduler, SchedulerDeps, SchedulerHandle, SkuSelection};
use crate::config::Settings;
use crate::domain::entities::price_decision::PriceDecision;
use crate::domain::entities::run::Run;
use crate::domain::entities::sku::SkuRecord;
use crate::domain::error::DomainError;
use crate::domain::ports::catalog::CatalogStore;
use crate::domain::ports::pricing_client::CompetitivePricingClient;
use crate::domain::ports::profile_store::ProfileStore;
use crate::domain::values::alert::Alert;
use crate::domain::values::floor::FloorRecord;
use crate::domain::values::guardrail::{GuardrailProfile, VersionedProfile};
use crate::domain::values::trigger::TriggerKind;
use crate::infrastructure::pricing::http_client::HttpPricingClient;
use crate::infrastructure::sqlite::audit_repo::{AlertFilter, DecisionFilter, RunFilter};
use crate::infrastructure::sqlite::SqliteStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

pub struct Repricer {
    settings: Settings,
    store: Arc<SqliteStore>,
    pricing: Arc<dyn CompetitivePricingClient>,
    profiles: Arc<ProfileRegistry>,
}

impl Repricer {
    pub fn new(settings: Settings) -> Result<Self, DomainError> {
        let pricing: Arc<dyn CompetitivePricingClient> = Arc::new(HttpPricingClient::new(&settings.pricing_api));
        Self::with_providers(settings, pricing)
    }

    pub fn with_providers(
        settings: Settings,
        pricing: Arc<dyn CompetitivePricingClient>,
    ) -> Result<Self, DomainError> {
        let store = Arc::new(SqliteStore::open(&settings.db_path)?);

        let active = match store.active_profile()? {
            Some(profile) => profile,
            None => {
                let profile = settings.default_profile.clone();
                store.save_profile(&profile)?;
                store.set_active(profile.name())?;
                info!(profile = profile.name(), "seeded default guardrail profile");
                profile
            }
        };

        Ok(Self {
            settings,
            store,
            pricing,
            profiles: Arc::new(ProfileRegistry::new(active)),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> Arc<SqliteStore> {
        self.store.clone()
    }

    fn deps(&self) -> SchedulerDeps {
        SchedulerDeps {
            catalog: self.store.clone(),
            floors: self.store.clone(),
            pricing: self.pricing.clone(),
            audit: self.store.clone(),
            alerts: self.store.clone(),
        }
    }

    /// Spawn the scheduler on the current runtime. Profile changes made
    /// through the returned handle are shared with this facade.
    pub fn start_scheduler(&self) -> Result<SchedulerHandle, DomainError> {
        Scheduler::spawn(self.deps(), self.settings.scheduler.clone(), self.profiles.clone())
    }

    /// Evaluate the given SKUs (all when empty) of one or every marketplace,
    /// wait for the cycles to finish and return the closed runs.
    pub async fn reprice(&self, marketplace: Option<&str>, skus: Vec<String>) -> Result<Vec<Run>, DomainError> {
        let started = Utc::now();
        let handle = self.start_scheduler()?;

        let marketplaces = match marketplace {
            Some(mp) => vec![mp.to_string()],
            None => self.store.marketplaces().await?,
        };
        for mp in &marketplaces {
            let selection = if skus.is_empty() {
                SkuSelection::All
            } else {
                SkuSelection::Skus(skus.clone())
            };
            handle.manual_trigger(mp, selection).await?;
        }
        handle.wait_idle().await?;
        handle.shutdown().await?;

        let mut runs = self.store.list_runs(&RunFilter {
            trigger_kind: Some(TriggerKind::Manual),
            started_since: Some(started),
            ..Default::default()
        })?;
        runs.retain(|run| marketplaces.contains(&run.marketplace));
        runs.reverse();
        Ok(runs)
    }

    /// Decision the active profile would produce for one SKU right now.
    pub async fn evaluate(&self, marketplace: &str, sku: &str) -> Result<PriceDecision, DomainError> {
        let deps = self.deps();
        let alerts = Arc::new(AlertDispatcher::new(deps.alerts.clone(), self.settings.scheduler.alert_throttle));
        let evaluator = build_evaluator(&deps, &self.settings.scheduler, alerts);
        let profile = self.profiles.active();
        evaluator.preview(marketplace, sku, &profile.profile).await
    }

    pub fn upsert_sku(&self, record: &SkuRecord) -> Result<(), DomainError> {
        if record.sku.trim().is_empty() || record.marketplace.trim().is_empty() {
            return Err(DomainError::InvalidInput("sku and marketplace must not be empty".into()));
        }
        self.store.upsert_sku(record)
    }

    pub fn set_floor(&self, marketplace: &str, sku: &str, floor: &FloorRecord) -> Result<(), DomainError> {
        self.store.set_floor(marketplace, sku, floor)
    }

    pub fn active_profile(&self) -> Arc<VersionedProfile> {
        self.profiles.active()
    }

    pub fn list_profiles(&self) -> Result<Vec<GuardrailProfile>, DomainError> {
        self.store.list_profiles()
    }

    /// Store a profile; activating it also publishes it to running cycles
    /// opened afterwards.
    pub fn save_profile(&self, profile: GuardrailProfile, activate: bool) -> Result<Arc<VersionedProfile>, DomainError> {
        self.store.save_profile(&profile)?;
        let replaces_active = self.profiles.active().profile.name() == profile.name();
        if activate {
            self.store.set_active(profile.name())?;
        }
        if activate || replaces_active {
            return Ok(self.profiles.publish(profile));
        }
        Ok(self.profiles.active())
    }

    pub fn activate_profile(&self, name: &str) -> Result<Arc<VersionedProfile>, DomainError> {
        let profile = self
            .store
            .get_profile(name)?
            .ok_or_else(|| DomainError::NotFound(format!("Guardrail profile not found: {name}")))?;
        self.store.set_active(name)?;
        Ok(self.profiles.publish(profile))
    }

    pub fn runs(&self, filter: &RunFilter) -> Result<Vec<Run>, DomainError> {
        self.store.list_runs(filter)
    }

    pub fn decisions(&self, filter: &DecisionFilter) -> Result<Vec<PriceDecision>, DomainError> {
        self.store.list_decisions(filter)
    }

    pub fn alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, DomainError> {
        self.store.list_alerts(filter)
    }
}
