use async_trait::async_trait;

use crate::domain::error::DomainError;
use crate::domain::values::floor::FloorRecord;

/// Supplier of per-SKU floor prices (the hourly governance feed).
///
/// Returns the latest known record; freshness is judged by the caller.
#[async_trait]
pub trait FloorPriceSource: Send + Sync {
    async fn load_floor(&self, marketplace: &str, sku: &str) -> Result<Option<FloorRecord>, DomainError>;
}
