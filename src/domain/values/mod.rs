pub mod alert;
pub mod execution;
pub mod floor;
pub mod guardrail;
pub mod reason_code;
pub mod snapshot;
pub mod trigger;
