//! Backoff schedule and retry classification.

use repricer::application::retry::{with_retry, RetryPolicy};
use repricer::domain::error::{DomainError, FailureClass, UpstreamError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(20), 0.25).unwrap()
}

#[test]
fn test_base_backoff_doubles_then_caps() {
    let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(10), 0.0).unwrap();
    assert_eq!(policy.base_backoff(1), Duration::from_secs(1));
    assert_eq!(policy.base_backoff(2), Duration::from_secs(2));
    assert_eq!(policy.base_backoff(3), Duration::from_secs(4));
    assert_eq!(policy.base_backoff(4), Duration::from_secs(8));
    assert_eq!(policy.base_backoff(5), Duration::from_secs(10));
    assert_eq!(policy.base_backoff(40), Duration::from_secs(10));
}

#[test]
fn test_jittered_backoff_is_non_decreasing() {
    let policy = RetryPolicy::default();
    // Worst case for monotonicity: maximum jitter then none.
    for retry in 1..10 {
        let high = policy.backoff_with_sample(retry, 0.999);
        let next_low = policy.backoff_with_sample(retry + 1, 0.0);
        assert!(next_low >= high, "retry {retry}: {next_low:?} < {high:?}");
    }
}

#[test]
fn test_policy_validation() {
    assert!(matches!(
        RetryPolicy::new(0, Duration::from_secs(1), Duration::from_secs(2), 0.1),
        Err(DomainError::Config(_))
    ));
    assert!(matches!(
        RetryPolicy::new(3, Duration::from_secs(5), Duration::from_secs(2), 0.1),
        Err(DomainError::Config(_))
    ));
    assert!(matches!(
        RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(2), 1.5),
        Err(DomainError::Config(_))
    ));
}

#[tokio::test]
async fn test_rate_limited_then_success() {
    let calls = AtomicU32::new(0);
    let result = with_retry(&fast_policy(5), "fetch_snapshot", || {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if call < 3 {
                Err(UpstreamError::RateLimited("429".into()))
            } else {
                Ok(42)
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(result.value, 42);
    assert_eq!(result.retries.len(), 3);
    assert!(result.retries.iter().all(|r| r.class == FailureClass::RateLimited));
    assert_eq!(
        result.retries.iter().map(|r| r.attempt).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[tokio::test]
async fn test_permanent_failure_not_retried() {
    let calls = AtomicU32::new(0);
    let failure = with_retry(&fast_policy(5), "submit_price", || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(UpstreamError::Permanent("invalid sku".into())) }
    })
    .await
    .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!failure.exhausted);
    assert!(failure.retries.is_empty());
    assert_eq!(failure.attempts(), 1);
}

#[tokio::test]
async fn test_attempt_budget_exhausted() {
    let calls = AtomicU32::new(0);
    let failure = with_retry(&fast_policy(3), "fetch_snapshot", || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(UpstreamError::Transient("503".into())) }
    })
    .await
    .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(failure.exhausted);
    assert_eq!(failure.retries.len(), 2);
    assert_eq!(failure.attempts(), 3);
    assert_eq!(failure.error.class(), FailureClass::Transient);
}
