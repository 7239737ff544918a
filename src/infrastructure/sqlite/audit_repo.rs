use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{dec, opt_dec, opt_ts, parse_dec, parse_enum, parse_ts, ts, SqliteStore};
use crate::domain::entities::price_decision::PriceDecision;
use crate::domain::entities::run::{Run, RunCounts};
use crate::domain::error::DomainError;
use crate::domain::ports::audit_sink::{AlertSink, AuditSink};
use crate::domain::values::alert::{Alert, AlertKind};
use crate::domain::values::trigger::TriggerKind;

const RUN_COLS: &str = "id, marketplace, trigger_kind, profile_name, profile_version, status, processed_count, updated_count, error_count, started_at, finished_at";
const DECISION_COLS: &str = "id, run_id, marketplace, sku, old_price, new_price, old_business_price, new_business_price, reason_code, status, context, decided_at";

#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub marketplace: Option<String>,
    pub trigger_kind: Option<TriggerKind>,
    /// Only runs started at or after this instant.
    pub started_since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct DecisionFilter {
    pub run_id: Option<String>,
    pub marketplace: Option<String>,
    pub sku: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub kind: Option<AlertKind>,
    pub limit: Option<usize>,
}

fn row_to_run(row: &rusqlite::Row) -> Result<Run, rusqlite::Error> {
    Ok(Run {
        id: row.get(0)?,
        marketplace: row.get(1)?,
        trigger_kind: parse_enum(2, &row.get::<_, String>(2)?)?,
        profile_name: row.get(3)?,
        profile_version: row.get::<_, i64>(4)? as u64,
        status: parse_enum(5, &row.get::<_, String>(5)?)?,
        counts: RunCounts {
            processed: row.get::<_, i64>(6)? as u64,
            updated: row.get::<_, i64>(7)? as u64,
            errors: row.get::<_, i64>(8)? as u64,
        },
        started_at: parse_ts(9, &row.get::<_, String>(9)?)?,
        finished_at: opt_ts(10, row.get(10)?)?,
    })
}

fn row_to_decision(row: &rusqlite::Row) -> Result<PriceDecision, rusqlite::Error> {
    let context: String = row.get(10)?;
    Ok(PriceDecision {
        id: row.get(0)?,
        run_id: row.get(1)?,
        marketplace: row.get(2)?,
        sku: row.get(3)?,
        old_price: parse_dec(4, &row.get::<_, String>(4)?)?,
        new_price: parse_dec(5, &row.get::<_, String>(5)?)?,
        old_business_price: opt_dec(6, row.get(6)?)?,
        new_business_price: opt_dec(7, row.get(7)?)?,
        reason_code: parse_enum(8, &row.get::<_, String>(8)?)?,
        status: parse_enum(9, &row.get::<_, String>(9)?)?,
        context: serde_json::from_str(&context).unwrap_or_default(),
        decided_at: parse_ts(11, &row.get::<_, String>(11)?)?,
    })
}

fn row_to_alert(row: &rusqlite::Row) -> Result<Alert, rusqlite::Error> {
    let details: String = row.get(4)?;
    Ok(Alert {
        id: row.get(0)?,
        kind: parse_enum(1, &row.get::<_, String>(1)?)?,
        severity: parse_enum(2, &row.get::<_, String>(2)?)?,
        message: row.get(3)?,
        details: serde_json::from_str(&details).unwrap_or(serde_json::Value::Null),
        created_at: parse_ts(5, &row.get::<_, String>(5)?)?,
    })
}

impl SqliteStore {
    pub fn get_run(&self, id: &str) -> Result<Option<Run>, DomainError> {
        let conn = self.conn()?;
        let run = conn
            .query_row(
                &format!("SELECT {RUN_COLS} FROM runs WHERE id = ?1"),
                params![id],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    /// Most recent first.
    pub fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>, DomainError> {
        let conn = self.conn()?;
        let mut sql = format!("SELECT {RUN_COLS} FROM runs WHERE 1=1");
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(marketplace) = &filter.marketplace {
            sql.push_str(&format!(" AND marketplace = ?{}", param_values.len() + 1));
            param_values.push(Box::new(marketplace.clone()));
        }
        if let Some(kind) = filter.trigger_kind {
            sql.push_str(&format!(" AND trigger_kind = ?{}", param_values.len() + 1));
            param_values.push(Box::new(kind.to_string()));
        }
        if let Some(since) = filter.started_since {
            sql.push_str(&format!(" AND started_at >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(ts(since)));
        }
        sql.push_str(" ORDER BY started_at DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT ?{}", param_values.len() + 1));
            param_values.push(Box::new(limit as i64));
        }

        let params_refs: Vec<&dyn rusqlite::types::ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params_refs.as_slice(), row_to_run)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// Oldest first, so a run's trail reads in evaluation order.
    pub fn list_decisions(&self, filter: &DecisionFilter) -> Result<Vec<PriceDecision>, DomainError> {
        let conn = self.conn()?;
        let mut sql = format!("SELECT {DECISION_COLS} FROM price_decisions WHERE 1=1");
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(run_id) = &filter.run_id {
            sql.push_str(&format!(" AND run_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(run_id.clone()));
        }
        if let Some(marketplace) = &filter.marketplace {
            sql.push_str(&format!(" AND marketplace = ?{}", param_values.len() + 1));
            param_values.push(Box::new(marketplace.clone()));
        }
        if let Some(sku) = &filter.sku {
            sql.push_str(&format!(" AND sku = ?{}", param_values.len() + 1));
            param_values.push(Box::new(sku.clone()));
        }
        sql.push_str(" ORDER BY decided_at, rowid");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT ?{}", param_values.len() + 1));
            param_values.push(Box::new(limit as i64));
        }

        let params_refs: Vec<&dyn rusqlite::types::ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let decisions = stmt
            .query_map(params_refs.as_slice(), row_to_decision)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(decisions)
    }

    /// Most recent first.
    pub fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, DomainError> {
        let conn = self.conn()?;
        let mut sql = String::from("SELECT id, kind, severity, message, details, created_at FROM alerts WHERE 1=1");
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(kind) = &filter.kind {
            sql.push_str(&format!(" AND kind = ?{}", param_values.len() + 1));
            param_values.push(Box::new(kind.to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC, rowid DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT ?{}", param_values.len() + 1));
            param_values.push(Box::new(limit as i64));
        }

        let params_refs: Vec<&dyn rusqlite::types::ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let alerts = stmt
            .query_map(params_refs.as_slice(), row_to_alert)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(alerts)
    }
}

#[async_trait]
impl AuditSink for SqliteStore {
    async fn open_run(&self, run: &Run) -> Result<(), DomainError> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO runs ({RUN_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
            params![
                run.id,
                run.marketplace,
                run.trigger_kind.to_string(),
                run.profile_name,
                run.profile_version as i64,
                run.status.to_string(),
                run.counts.processed as i64,
                run.counts.updated as i64,
                run.counts.errors as i64,
                ts(run.started_at),
                run.finished_at.map(ts),
            ],
        )
        .map_err(|e| DomainError::Database(format!("Failed to open run: {e}")))?;
        Ok(())
    }

    async fn record_decision(&self, decision: &PriceDecision) -> Result<(), DomainError> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO price_decisions ({DECISION_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
            params![
                decision.id,
                decision.run_id,
                decision.marketplace,
                decision.sku,
                dec(decision.old_price),
                dec(decision.new_price),
                decision.old_business_price.map(dec),
                decision.new_business_price.map(dec),
                decision.reason_code.as_str(),
                decision.status.to_string(),
                serde_json::to_string(&decision.context)?,
                ts(decision.decided_at),
            ],
        )
        .map_err(|e| DomainError::Database(format!("Failed to record decision: {e}")))?;
        Ok(())
    }

    async fn close_run(&self, run: &Run) -> Result<(), DomainError> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE runs SET status = ?1, processed_count = ?2, updated_count = ?3, error_count = ?4, finished_at = ?5 WHERE id = ?6",
            params![
                run.status.to_string(),
                run.counts.processed as i64,
                run.counts.updated as i64,
                run.counts.errors as i64,
                run.finished_at.map(ts),
                run.id,
            ],
        )?;
        if rows == 0 {
            return Err(DomainError::NotFound(format!("Run not found: {}", run.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl AlertSink for SqliteStore {
    async fn raise_alert(&self, alert: &Alert) -> Result<(), DomainError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO alerts (id, kind, severity, message, details, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                alert.id,
                alert.kind.to_string(),
                alert.severity.to_string(),
                alert.message,
                serde_json::to_string(&alert.details)?,
                ts(alert.created_at),
            ],
        )
        .map_err(|e| DomainError::Database(format!("Failed to record alert: {e}")))?;
        Ok(())
    }

    async fn last_raised_at(&self, throttle_key: &str) -> Result<Option<DateTime<Utc>>, DomainError> {
        let conn = self.conn()?;
        let raw: Option<String> = conn.query_row(
            "SELECT MAX(created_at) FROM alerts WHERE json_extract(details, '$.throttle_key') = ?1",
            params![throttle_key],
            |row| row.get(0),
        )?;
        Ok(opt_ts(0, raw)?)
    }
}
