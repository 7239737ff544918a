use rusqlite::Connection;

use crate::domain::error::DomainError;

pub fn run_migrations(conn: &Connection) -> Result<(), DomainError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS skus (
            marketplace TEXT NOT NULL,
            sku TEXT NOT NULL,
            current_price TEXT NOT NULL,
            current_business_price TEXT,
            floor_price TEXT NOT NULL,
            min_business_price TEXT,
            cost TEXT,
            holds_buy_box INTEGER NOT NULL DEFAULT 0,
            day_open_price TEXT,
            day_open_date TEXT,
            last_step_up_at TEXT,
            last_evaluated_at TEXT,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (marketplace, sku)
        );

        CREATE TABLE IF NOT EXISTS floor_prices (
            marketplace TEXT NOT NULL,
            sku TEXT NOT NULL,
            floor_price TEXT NOT NULL,
            min_business_price TEXT,
            as_of TEXT NOT NULL,
            PRIMARY KEY (marketplace, sku)
        );

        CREATE TABLE IF NOT EXISTS runs (
            id TEXT PRIMARY KEY,
            marketplace TEXT NOT NULL,
            trigger_kind TEXT NOT NULL,
            profile_name TEXT NOT NULL,
            profile_version INTEGER NOT NULL,
            status TEXT NOT NULL,
            processed_count INTEGER NOT NULL DEFAULT 0,
            updated_count INTEGER NOT NULL DEFAULT 0,
            error_count INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL,
            finished_at TEXT
        );

        CREATE TABLE IF NOT EXISTS price_decisions (
            id TEXT PRIMARY KEY,
            run_id TEXT,
            marketplace TEXT NOT NULL,
            sku TEXT NOT NULL,
            old_price TEXT NOT NULL,
            new_price TEXT NOT NULL,
            old_business_price TEXT,
            new_business_price TEXT,
            reason_code TEXT NOT NULL,
            status TEXT NOT NULL,
            context TEXT NOT NULL DEFAULT '{}',
            decided_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS alerts (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            severity TEXT NOT NULL,
            message TEXT NOT NULL,
            details TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS guardrail_profiles (
            name TEXT PRIMARY KEY,
            config TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_skus_evaluated ON skus(marketplace, last_evaluated_at);
        CREATE INDEX IF NOT EXISTS idx_runs_started ON runs(started_at);
        CREATE INDEX IF NOT EXISTS idx_decisions_run ON price_decisions(run_id);
        CREATE INDEX IF NOT EXISTS idx_decisions_sku ON price_decisions(marketplace, sku, decided_at);
        CREATE INDEX IF NOT EXISTS idx_alerts_created ON alerts(created_at);
        ",
    )
    .map_err(|e| DomainError::Database(format!("Migration failed: {e}")))
}
