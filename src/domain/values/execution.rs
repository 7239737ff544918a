/// Whether accepted price changes are pushed upstream

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Execution mode for repricing cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Decisions are computed and recorded but never submitted.
    DryRun,
    #[default]
    Live,
}

impl ExecutionMode {
    pub fn submits(self) -> bool {
        matches!(self, ExecutionMode::Live)
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::DryRun => write!(f, "dry_run"),
            ExecutionMode::Live => write!(f, "live"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dry_run" | "dry-run" | "test" => Ok(ExecutionMode::DryRun),
            "live" => Ok(ExecutionMode::Live),
            _ => Err(format!("Unknown execution mode: {s}")),
        }
    }
}
