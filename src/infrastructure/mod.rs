pub mod pricing;
pub mod sqlite;
