use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::price_decision::PriceDecision;
use crate::domain::entities::run::Run;
use crate::domain::error::DomainError;
use crate::domain::values::alert::Alert;

/// Durable sink for the run audit trail.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn open_run(&self, run: &Run) -> Result<(), DomainError>;
    async fn record_decision(&self, decision: &PriceDecision) -> Result<(), DomainError>;
    async fn close_run(&self, run: &Run) -> Result<(), DomainError>;
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise_alert(&self, alert: &Alert) -> Result<(), DomainError>;
    /// When an alert carrying this throttle key was last recorded.
    async fn last_raised_at(&self, throttle_key: &str) -> Result<Option<DateTime<Utc>>, DomainError>;
}
