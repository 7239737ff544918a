use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What caused a SKU to be enqueued (and, for the first entry, a run to open).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Notification,
    Fallback,
    Manual,
}

impl TriggerKind {
    pub fn priority(self) -> Priority {
        match self {
            TriggerKind::Notification | TriggerKind::Manual => Priority::High,
            TriggerKind::Fallback => Priority::Low,
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Notification => write!(f, "notification"),
            TriggerKind::Fallback => write!(f, "fallback"),
            TriggerKind::Manual => write!(f, "manual"),
        }
    }
}

impl FromStr for TriggerKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "notification" => Ok(TriggerKind::Notification),
            "fallback" => Ok(TriggerKind::Fallback),
            "manual" => Ok(TriggerKind::Manual),
            _ => Err(format!("Unknown trigger kind: {s}")),
        }
    }
}

/// Dispatch band in the work queue. `High` drains before `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Low,
}
