use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::values::floor::FloorRecord;

/// Identity of a unit of repricing work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SkuKey {
    pub marketplace: String,
    pub sku: String,
}

impl SkuKey {
    pub fn new(marketplace: impl Into<String>, sku: impl Into<String>) -> Self {
        Self {
            marketplace: marketplace.into(),
            sku: sku.into(),
        }
    }
}

impl std::fmt::Display for SkuKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.marketplace, self.sku)
    }
}

/// Point-in-time copy of a catalog entry. The core never writes it back
/// directly; it only proposes new prices through decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuRecord {
    pub sku: String,
    pub marketplace: String,
    pub current_price: Decimal,
    #[serde(default)]
    pub current_business_price: Option<Decimal>,
    pub floor_price: Decimal,
    #[serde(default)]
    pub min_business_price: Option<Decimal>,
    /// Unit cost, when the catalog knows it. Drives the minimum-margin clamp.
    #[serde(default)]
    pub cost: Option<Decimal>,
    #[serde(default)]
    pub holds_buy_box: bool,
    /// Listed price at the start of the current UTC day.
    #[serde(default)]
    pub day_open_price: Option<Decimal>,
    #[serde(default)]
    pub last_step_up_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_evaluated_at: Option<DateTime<Utc>>,
}

impl SkuRecord {
    /// Copy of this record with the floor fields taken from a feed record.
    pub fn with_floor(&self, floor: &FloorRecord) -> Self {
        Self {
            floor_price: floor.floor_price,
            min_business_price: floor.min_business_price,
            ..self.clone()
        }
    }

    pub fn day_open_or_current(&self) -> Decimal {
        self.day_open_price.unwrap_or(self.current_price)
    }
}
