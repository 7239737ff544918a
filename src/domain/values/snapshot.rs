use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time view of the competition for one SKU.
///
/// Fetched fresh for every evaluation and dropped with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorSnapshot {
    pub lowest_competitor_price: Option<Decimal>,
    pub is_buy_box_winner: bool,
    pub buy_box_price: Option<Decimal>,
    pub snapshot_time: DateTime<Utc>,
}

impl CompetitorSnapshot {
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.snapshot_time
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age_at(now) > max_age
    }
}
