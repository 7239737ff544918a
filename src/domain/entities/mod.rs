pub mod price_decision;
pub mod run;
pub mod sku;
