//! Guardrail profile storage, activation and the versioned registry.

mod common;

use chrono::Duration;
use common::*;
use repricer::application::profiles::ProfileRegistry;
use repricer::domain::error::DomainError;
use repricer::domain::values::guardrail::{GuardrailProfile, DEFAULT_PROFILE_NAME};

fn named(name: &str) -> GuardrailProfile {
    GuardrailProfile::new(name, d("10"), d("1"), Duration::hours(2), d("5"), d("1")).unwrap()
}

#[test]
fn test_default_profile_seeded() {
    let repricer = setup(ScriptedPricing::new());
    let active = repricer.active_profile();
    assert_eq!(active.profile.name(), DEFAULT_PROFILE_NAME);
    assert_eq!(active.version, 1);

    let stored = repricer.list_profiles().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], GuardrailProfile::default());
}

#[test]
fn test_save_without_activation_keeps_active() {
    let repricer = setup(ScriptedPricing::new());
    let active = repricer.save_profile(named("Aggressive"), false).unwrap();

    assert_eq!(active.profile.name(), DEFAULT_PROFILE_NAME);
    assert_eq!(repricer.list_profiles().unwrap().len(), 2);
}

#[test]
fn test_activate_publishes_new_version() {
    let repricer = setup(ScriptedPricing::new());
    repricer.save_profile(named("Aggressive"), false).unwrap();

    let active = repricer.activate_profile("Aggressive").unwrap();
    assert_eq!(active.profile.name(), "Aggressive");
    assert_eq!(active.version, 2);
    assert_eq!(repricer.active_profile().profile, named("Aggressive"));
}

#[test]
fn test_updating_active_profile_republishes() {
    let repricer = setup(ScriptedPricing::new());
    let tweaked = GuardrailProfile::new(
        DEFAULT_PROFILE_NAME,
        d("15"),
        d("2"),
        Duration::hours(6),
        d("0"),
        d("0.5"),
    )
    .unwrap();

    let active = repricer.save_profile(tweaked.clone(), false).unwrap();
    assert_eq!(active.version, 2);
    assert_eq!(active.profile, tweaked);
}

#[test]
fn test_activate_unknown_profile() {
    let repricer = setup(ScriptedPricing::new());
    assert!(matches!(
        repricer.activate_profile("Missing"),
        Err(DomainError::NotFound(_))
    ));
    assert_eq!(repricer.active_profile().profile.name(), DEFAULT_PROFILE_NAME);
}

#[test]
fn test_registry_snapshots_are_immutable() {
    let registry = ProfileRegistry::default();
    let before = registry.active();
    let after = registry.publish(named("Next"));

    assert_eq!(before.profile.name(), DEFAULT_PROFILE_NAME);
    assert_eq!(before.version, 1);
    assert_eq!(after.version, 2);
    assert_eq!(registry.active().profile.name(), "Next");
}

#[test]
fn test_active_profile_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("profiles.db").to_str().unwrap().to_string();
    let settings = || repricer::config::Settings {
        db_path: db_path.clone(),
        scheduler: fast_config(),
        ..Default::default()
    };

    {
        let repricer = repricer::Repricer::with_providers(settings(), ScriptedPricing::new()).unwrap();
        repricer.save_profile(named("Aggressive"), true).unwrap();
    }

    let repricer = repricer::Repricer::with_providers(settings(), ScriptedPricing::new()).unwrap();
    assert_eq!(repricer.active_profile().profile.name(), "Aggressive");
}
