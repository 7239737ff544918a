use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::entities::sku::SkuRecord;
use crate::domain::error::DomainError;

/// Price change accepted upstream, to be reflected in the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedPrice {
    pub price: Decimal,
    pub business_price: Option<Decimal>,
    pub stepped_up: bool,
    pub applied_at: DateTime<Utc>,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_sku(&self, marketplace: &str, sku: &str) -> Result<Option<SkuRecord>, DomainError>;
    async fn list_skus(&self, marketplace: &str) -> Result<Vec<SkuRecord>, DomainError>;
    /// Oldest `last_evaluated_at` first; never-evaluated SKUs lead.
    async fn least_recently_evaluated(&self, marketplace: &str, limit: usize) -> Result<Vec<SkuRecord>, DomainError>;
    async fn marketplaces(&self) -> Result<Vec<String>, DomainError>;
    async fn record_applied_price(&self, marketplace: &str, sku: &str, applied: &AppliedPrice) -> Result<(), DomainError>;
    async fn mark_evaluated(&self, marketplace: &str, sku: &str, at: DateTime<Utc>) -> Result<(), DomainError>;
}
