//! Environment-driven settings.

use repricer::config::Settings;
use repricer::domain::error::DomainError;
use repricer::domain::values::guardrail;

#[test]
fn test_out_of_range_minutes_are_config_errors() {
    assert!(matches!(
        guardrail::minutes("floor_stale_after", i64::MAX),
        Err(DomainError::Config(_))
    ));
    assert_eq!(guardrail::minutes("floor_stale_after", 90).unwrap().num_minutes(), 90);

    std::env::set_var("REPRICER_ALERT_THROTTLE_MINUTES", i64::MAX.to_string());
    let result = Settings::from_env();
    std::env::remove_var("REPRICER_ALERT_THROTTLE_MINUTES");
    match result {
        Err(DomainError::Config(msg)) => assert!(msg.contains("REPRICER_ALERT_THROTTLE_MINUTES")),
        other => panic!("expected config error, got {:?}", other.map(|s| s.db_path)),
    }
}
