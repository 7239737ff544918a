use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Audit tag explaining why a decision, skip or failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    StepUp,
    Holding,
    Undercut,
    FloorClamped,
    AlreadyOptimal,
    SkippedNoData,
    ConfigError,
    UpstreamRejected,
    RetriesExhausted,
    CycleAborted,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::StepUp => "STEP_UP",
            ReasonCode::Holding => "HOLDING",
            ReasonCode::Undercut => "UNDERCUT",
            ReasonCode::FloorClamped => "FLOOR_CLAMPED",
            ReasonCode::AlreadyOptimal => "ALREADY_OPTIMAL",
            ReasonCode::SkippedNoData => "SKIPPED_NO_DATA",
            ReasonCode::ConfigError => "CONFIG_ERROR",
            ReasonCode::UpstreamRejected => "UPSTREAM_REJECTED",
            ReasonCode::RetriesExhausted => "RETRIES_EXHAUSTED",
            ReasonCode::CycleAborted => "CYCLE_ABORTED",
        }
    }

    /// Reason codes that count towards a run's `error_count`.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ReasonCode::ConfigError
                | ReasonCode::UpstreamRejected
                | ReasonCode::RetriesExhausted
                | ReasonCode::CycleAborted
        )
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasonCode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STEP_UP" => Ok(ReasonCode::StepUp),
            "HOLDING" => Ok(ReasonCode::Holding),
            "UNDERCUT" => Ok(ReasonCode::Undercut),
            "FLOOR_CLAMPED" => Ok(ReasonCode::FloorClamped),
            "ALREADY_OPTIMAL" => Ok(ReasonCode::AlreadyOptimal),
            "SKIPPED_NO_DATA" => Ok(ReasonCode::SkippedNoData),
            "CONFIG_ERROR" => Ok(ReasonCode::ConfigError),
            "UPSTREAM_REJECTED" => Ok(ReasonCode::UpstreamRejected),
            "RETRIES_EXHAUSTED" => Ok(ReasonCode::RetriesExhausted),
            "CYCLE_ABORTED" => Ok(ReasonCode::CycleAborted),
            _ => Err(format!("Unknown reason code: {s}")),
        }
    }
}
