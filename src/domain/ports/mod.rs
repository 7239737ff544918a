pub mod audit_sink;
pub mod catalog;
pub mod floor_source;
pub mod pricing_client;
pub mod profile_store;
