use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl From<rusqlite::Error> for DomainError {
    fn from(e: rusqlite::Error) -> Self {
        DomainError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::InvalidInput(e.to_string())
    }
}

/// How the scheduler should react to a failed upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureClass {
    RateLimited,
    Transient,
    Permanent,
}

impl FailureClass {
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureClass::Permanent)
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::RateLimited => write!(f, "RATE_LIMITED"),
            FailureClass::Transient => write!(f, "TRANSIENT"),
            FailureClass::Permanent => write!(f, "PERMANENT"),
        }
    }
}

/// Error returned by the competitive pricing API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("rejected: {0}")]
    Permanent(String),
}

impl UpstreamError {
    pub fn class(&self) -> FailureClass {
        match self {
            UpstreamError::RateLimited(_) => FailureClass::RateLimited,
            UpstreamError::Transient(_) => FailureClass::Transient,
            UpstreamError::Permanent(_) => FailureClass::Permanent,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            UpstreamError::RateLimited(m) | UpstreamError::Transient(m) | UpstreamError::Permanent(m) => m,
        }
    }
}
