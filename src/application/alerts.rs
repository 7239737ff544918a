use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, warn};

use crate::domain::ports::audit_sink::AlertSink;
use crate::domain::values::alert::{Alert, AlertKind, AlertSeverity};

/// Raises alerts through the sink, at most once per `window` for each key.
pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
    window: Duration,
    last_raised: Mutex<HashMap<String, DateTime<Utc>>>,
    streaks: Mutex<HashMap<String, u32>>,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>, window: Duration) -> Self {
        Self {
            sink,
            window,
            last_raised: Mutex::new(HashMap::new()),
            streaks: Mutex::new(HashMap::new()),
        }
    }

    /// True if no alert for `key` was let through within the window.
    /// Recording happens here, so a `true` answer claims the slot.
    pub fn should_raise(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut last = self.last_raised.lock().unwrap_or_else(PoisonError::into_inner);
        match last.get(key) {
            Some(at) if now - *at < self.window => false,
            _ => {
                last.insert(key.to_string(), now);
                true
            }
        }
    }

    /// Bump (or reset) a consecutive-occurrence counter and return its value.
    pub fn streak(&self, key: &str, hit: bool) -> u32 {
        let mut streaks = self.streaks.lock().unwrap_or_else(PoisonError::into_inner);
        if hit {
            let count = streaks.entry(key.to_string()).or_insert(0);
            *count += 1;
            *count
        } else {
            streaks.remove(key);
            0
        }
    }

    /// Raise unconditionally. Sink failures are logged, never propagated.
    pub async fn raise(
        &self,
        kind: AlertKind,
        severity: AlertSeverity,
        message: String,
        details: serde_json::Value,
    ) {
        warn!(kind = %kind, severity = %severity, "alert: {message}");
        let alert = Alert::new(kind, severity, message, details);
        if let Err(e) = self.sink.raise_alert(&alert).await {
            error!(kind = %kind, "failed to record alert: {e}");
        }
    }

    /// Raise unless an alert for `key` already went out within the window.
    pub async fn raise_throttled(
        &self,
        key: &str,
        kind: AlertKind,
        severity: AlertSeverity,
        message: String,
        details: serde_json::Value,
    ) -> bool {
        self.load_last_raised(key).await;
        if !self.should_raise(key, Utc::now()) {
            return false;
        }
        let mut details = details;
        if let Some(map) = details.as_object_mut() {
            map.insert("throttle_key".into(), key.into());
        }
        self.raise(kind, severity, message, details).await;
        true
    }

    /// Pick up a throttle window opened by an earlier process.
    async fn load_last_raised(&self, key: &str) {
        if self.last_raised.lock().unwrap_or_else(PoisonError::into_inner).contains_key(key) {
            return;
        }
        match self.sink.last_raised_at(key).await {
            Ok(Some(at)) => {
                self.last_raised
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(key.to_string())
                    .or_insert(at);
            }
            Ok(None) => {}
            Err(e) => warn!(key, "failed to read alert history: {e}"),
        }
    }
}
