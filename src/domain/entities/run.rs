use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::values::trigger::TriggerKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Aborted => write!(f, "aborted"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "aborted" => Ok(RunStatus::Aborted),
            _ => Err(format!("Unknown run status: {s}")),
        }
    }
}

/// Aggregate counts of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub processed: u64,
    pub updated: u64,
    pub errors: u64,
}

/// One scheduling cycle for a marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub marketplace: String,
    pub trigger_kind: TriggerKind,
    pub profile_name: String,
    pub profile_version: u64,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn open(
        marketplace: String,
        trigger_kind: TriggerKind,
        profile_name: String,
        profile_version: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            marketplace,
            trigger_kind,
            profile_name,
            profile_version,
            status: RunStatus::Running,
            counts: RunCounts::default(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn close(&mut self, status: RunStatus, counts: RunCounts) {
        self.status = status;
        self.counts = counts;
        self.finished_at = Some(Utc::now());
    }

    pub fn is_open(&self) -> bool {
        self.finished_at.is_none()
    }
}
