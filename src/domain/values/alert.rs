use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    StaleFloorFeed,
    MissingFloor,
    RetriesExhausted,
    RecurringRejection,
    PersistentNoData,
    QueueOverflow,
    CycleAborted,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertKind::StaleFloorFeed => "STALE_FLOOR_FEED",
            AlertKind::MissingFloor => "MISSING_FLOOR",
            AlertKind::RetriesExhausted => "RETRIES_EXHAUSTED",
            AlertKind::RecurringRejection => "RECURRING_REJECTION",
            AlertKind::PersistentNoData => "PERSISTENT_NO_DATA",
            AlertKind::QueueOverflow => "QUEUE_OVERFLOW",
            AlertKind::CycleAborted => "CYCLE_ABORTED",
        };
        f.write_str(s)
    }
}

impl FromStr for AlertKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STALE_FLOOR_FEED" => Ok(AlertKind::StaleFloorFeed),
            "MISSING_FLOOR" => Ok(AlertKind::MissingFloor),
            "RETRIES_EXHAUSTED" => Ok(AlertKind::RetriesExhausted),
            "RECURRING_REJECTION" => Ok(AlertKind::RecurringRejection),
            "PERSISTENT_NO_DATA" => Ok(AlertKind::PersistentNoData),
            "QUEUE_OVERFLOW" => Ok(AlertKind::QueueOverflow),
            "CYCLE_ABORTED" => Ok(AlertKind::CycleAborted),
            _ => Err(format!("Unknown alert kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "info"),
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for AlertSeverity {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(AlertSeverity::Info),
            "warning" => Ok(AlertSeverity::Warning),
            "critical" => Ok(AlertSeverity::Critical),
            _ => Err(format!("Unknown alert severity: {s}")),
        }
    }
}

/// Operator-facing alert raised by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        kind: AlertKind,
        severity: AlertSeverity,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            severity,
            message: message.into(),
            details,
            created_at: Utc::now(),
        }
    }
}
