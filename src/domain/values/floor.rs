use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Floor prices for one SKU as published by the governance feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorRecord {
    pub floor_price: Decimal,
    pub min_business_price: Option<Decimal>,
    pub as_of: DateTime<Utc>,
}

impl FloorRecord {
    /// A floor older than `max_age` must be treated as absent.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.as_of <= max_age
    }
}
