use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{dec, opt_dec, opt_ts, parse_dec, parse_ts, ts, SqliteStore};
use crate::domain::entities::sku::SkuRecord;
use crate::domain::error::DomainError;
use crate::domain::ports::catalog::{AppliedPrice, CatalogStore};
use crate::domain::ports::floor_source::FloorPriceSource;
use crate::domain::values::floor::FloorRecord;

const SKU_COLS: &str = "sku, marketplace, current_price, current_business_price, floor_price, min_business_price, cost, holds_buy_box, day_open_price, day_open_date, last_step_up_at, last_evaluated_at";

/// `day_open_price` only counts on the UTC day it was captured.
fn row_to_sku(row: &rusqlite::Row, today: &str) -> Result<SkuRecord, rusqlite::Error> {
    let day_open_date: Option<String> = row.get(9)?;
    let day_open_price = match day_open_date.as_deref() {
        Some(d) if d == today => opt_dec(8, row.get(8)?)?,
        _ => None,
    };
    Ok(SkuRecord {
        sku: row.get(0)?,
        marketplace: row.get(1)?,
        current_price: parse_dec(2, &row.get::<_, String>(2)?)?,
        current_business_price: opt_dec(3, row.get(3)?)?,
        floor_price: parse_dec(4, &row.get::<_, String>(4)?)?,
        min_business_price: opt_dec(5, row.get(5)?)?,
        cost: opt_dec(6, row.get(6)?)?,
        holds_buy_box: row.get::<_, i32>(7)? != 0,
        day_open_price,
        last_step_up_at: opt_ts(10, row.get(10)?)?,
        last_evaluated_at: opt_ts(11, row.get(11)?)?,
    })
}

fn today() -> String {
    Utc::now().date_naive().to_string()
}

impl SqliteStore {
    /// Insert or replace a catalog entry. Evaluation bookkeeping already
    /// stored for the SKU is kept unless the record carries its own.
    pub fn upsert_sku(&self, record: &SkuRecord) -> Result<(), DomainError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO skus (marketplace, sku, current_price, current_business_price, floor_price, min_business_price, cost, holds_buy_box, last_step_up_at, last_evaluated_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(marketplace, sku) DO UPDATE SET
                current_price = excluded.current_price,
                current_business_price = excluded.current_business_price,
                floor_price = excluded.floor_price,
                min_business_price = excluded.min_business_price,
                cost = excluded.cost,
                holds_buy_box = excluded.holds_buy_box,
                last_step_up_at = COALESCE(excluded.last_step_up_at, skus.last_step_up_at),
                last_evaluated_at = COALESCE(excluded.last_evaluated_at, skus.last_evaluated_at),
                updated_at = excluded.updated_at",
            params![
                record.marketplace,
                record.sku,
                dec(record.current_price),
                record.current_business_price.map(dec),
                dec(record.floor_price),
                record.min_business_price.map(dec),
                record.cost.map(dec),
                record.holds_buy_box as i32,
                record.last_step_up_at.map(ts),
                record.last_evaluated_at.map(ts),
                ts(Utc::now()),
            ],
        )
        .map_err(|e| DomainError::Database(format!("Failed to upsert SKU: {e}")))?;
        Ok(())
    }

    /// Store a floor-feed record and mirror it onto the catalog entry.
    pub fn set_floor(&self, marketplace: &str, sku: &str, floor: &FloorRecord) -> Result<(), DomainError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO floor_prices (marketplace, sku, floor_price, min_business_price, as_of)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(marketplace, sku) DO UPDATE SET
                floor_price = excluded.floor_price,
                min_business_price = excluded.min_business_price,
                as_of = excluded.as_of",
            params![
                marketplace,
                sku,
                dec(floor.floor_price),
                floor.min_business_price.map(dec),
                ts(floor.as_of),
            ],
        )
        .map_err(|e| DomainError::Database(format!("Failed to store floor: {e}")))?;
        conn.execute(
            "UPDATE skus SET floor_price = ?1, min_business_price = ?2 WHERE marketplace = ?3 AND sku = ?4",
            params![
                dec(floor.floor_price),
                floor.min_business_price.map(dec),
                marketplace,
                sku
            ],
        )?;
        Ok(())
    }

    fn query_skus(&self, sql: &str, params: &[&dyn rusqlite::types::ToSql]) -> Result<Vec<SkuRecord>, DomainError> {
        let conn = self.conn()?;
        let today = today();
        let mut stmt = conn.prepare(sql)?;
        let skus = stmt
            .query_map(params, |row| row_to_sku(row, &today))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(skus)
    }
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn get_sku(&self, marketplace: &str, sku: &str) -> Result<Option<SkuRecord>, DomainError> {
        let conn = self.conn()?;
        let today = today();
        let record = conn
            .query_row(
                &format!("SELECT {SKU_COLS} FROM skus WHERE marketplace = ?1 AND sku = ?2"),
                params![marketplace, sku],
                |row| row_to_sku(row, &today),
            )
            .optional()?;
        Ok(record)
    }

    async fn list_skus(&self, marketplace: &str) -> Result<Vec<SkuRecord>, DomainError> {
        self.query_skus(
            &format!("SELECT {SKU_COLS} FROM skus WHERE marketplace = ?1 ORDER BY sku"),
            params![marketplace],
        )
    }

    async fn least_recently_evaluated(&self, marketplace: &str, limit: usize) -> Result<Vec<SkuRecord>, DomainError> {
        let limit = limit as i64;
        self.query_skus(
            &format!(
                "SELECT {SKU_COLS} FROM skus WHERE marketplace = ?1
                 ORDER BY last_evaluated_at IS NOT NULL, last_evaluated_at, sku
                 LIMIT ?2"
            ),
            params![marketplace, limit],
        )
    }

    async fn marketplaces(&self) -> Result<Vec<String>, DomainError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT marketplace FROM skus ORDER BY marketplace")?;
        let marketplaces = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(marketplaces)
    }

    async fn record_applied_price(
        &self,
        marketplace: &str,
        sku: &str,
        applied: &AppliedPrice,
    ) -> Result<(), DomainError> {
        let conn = self.conn()?;
        let day = applied.applied_at.date_naive().to_string();
        let rows = conn.execute(
            "UPDATE skus SET
                day_open_price = CASE WHEN day_open_date IS ?1 THEN day_open_price ELSE current_price END,
                day_open_date = ?1,
                current_price = ?2,
                current_business_price = ?3,
                last_step_up_at = CASE WHEN ?4 THEN ?5 ELSE last_step_up_at END,
                updated_at = ?5
             WHERE marketplace = ?6 AND sku = ?7",
            params![
                day,
                dec(applied.price),
                applied.business_price.map(dec),
                applied.stepped_up,
                ts(applied.applied_at),
                marketplace,
                sku,
            ],
        )?;
        if rows == 0 {
            return Err(DomainError::NotFound(format!("SKU {marketplace}/{sku}")));
        }
        Ok(())
    }

    async fn mark_evaluated(&self, marketplace: &str, sku: &str, at: DateTime<Utc>) -> Result<(), DomainError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE skus SET last_evaluated_at = ?1 WHERE marketplace = ?2 AND sku = ?3",
            params![ts(at), marketplace, sku],
        )?;
        Ok(())
    }
}

#[async_trait]
impl FloorPriceSource for SqliteStore {
    async fn load_floor(&self, marketplace: &str, sku: &str) -> Result<Option<FloorRecord>, DomainError> {
        let conn = self.conn()?;
        let floor = conn
            .query_row(
                "SELECT floor_price, min_business_price, as_of FROM floor_prices WHERE marketplace = ?1 AND sku = ?2",
                params![marketplace, sku],
                |row| {
                    Ok(FloorRecord {
                        floor_price: parse_dec(0, &row.get::<_, String>(0)?)?,
                        min_business_price: opt_dec(1, row.get(1)?)?,
                        as_of: parse_ts(2, &row.get::<_, String>(2)?)?,
                    })
                },
            )
            .optional()?;
        Ok(floor)
    }
}
