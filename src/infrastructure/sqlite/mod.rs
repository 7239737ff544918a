//! SQLite persistence for the catalog, floor feed, audit trail, alerts and
//! guardrail profiles.
//!
//! One connection behind a mutex serves every port, so `:memory:` databases
//! behave like file-backed ones. Prices are stored as decimal text and
//! timestamps as RFC 3339 UTC with microseconds, which keeps lexical order
//! equal to time order.

pub mod audit_repo;
pub mod catalog_repo;
pub mod migrations;
pub mod profile_repo;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::domain::error::DomainError;
use migrations::run_migrations;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &str) -> Result<Self, DomainError> {
        let conn = Connection::open(db_path).map_err(|e| DomainError::Database(format!("DB error: {e}")))?;
        if db_path != ":memory:" {
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| DomainError::Database(format!("WAL error: {e}")))?;
        }
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, DomainError> {
        Self::open(":memory:")
    }

    pub fn with_connection(conn: Connection) -> Result<Self, DomainError> {
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DomainError> {
        self.conn.lock().map_err(|e| DomainError::Database(e.to_string()))
    }
}

pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn dec(value: Decimal) -> String {
    value.to_string()
}

pub(crate) fn parse_ts(idx: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_dec(idx: usize, raw: &str) -> Result<Decimal, rusqlite::Error> {
    Decimal::from_str(raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_enum<T: FromStr<Err = String>>(idx: usize, raw: &str) -> Result<T, rusqlite::Error> {
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

pub(crate) fn opt_dec(idx: usize, raw: Option<String>) -> Result<Option<Decimal>, rusqlite::Error> {
    raw.map(|s| parse_dec(idx, &s)).transpose()
}

pub(crate) fn opt_ts(idx: usize, raw: Option<String>) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    raw.map(|s| parse_ts(idx, &s)).transpose()
}
