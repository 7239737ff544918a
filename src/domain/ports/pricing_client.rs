//! Port to the upstream competitive pricing API.
//!
//! Implementations own transport, authentication and their own request
//! throttling. Every failure must be classified through [`UpstreamError`] so
//! the scheduler can decide between retrying and recording a rejection.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::error::UpstreamError;
use crate::domain::values::snapshot::CompetitorSnapshot;

/// Acknowledgement returned for an accepted price update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionAck {
    /// Upstream reference for the submission, if any.
    pub reference: Option<String>,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait CompetitivePricingClient: Send + Sync {
    /// Session setup for a marketplace. A failure here aborts the whole cycle.
    async fn connect(&self, _marketplace: &str) -> Result<(), UpstreamError> {
        Ok(())
    }

    async fn fetch_snapshot(
        &self,
        marketplace: &str,
        sku: &str,
    ) -> Result<CompetitorSnapshot, UpstreamError>;

    async fn submit_price(
        &self,
        marketplace: &str,
        sku: &str,
        new_price: Decimal,
        new_business_price: Option<Decimal>,
    ) -> Result<SubmissionAck, UpstreamError>;
}
