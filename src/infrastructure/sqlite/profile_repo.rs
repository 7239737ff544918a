use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{ts, SqliteStore};
use crate::domain::error::DomainError;
use crate::domain::ports::profile_store::ProfileStore;
use crate::domain::values::guardrail::GuardrailProfile;

fn parse_profile(config: &str) -> Result<GuardrailProfile, DomainError> {
    serde_json::from_str(config).map_err(|e| DomainError::Config(format!("Stored guardrail profile is invalid: {e}")))
}

impl ProfileStore for SqliteStore {
    fn save_profile(&self, profile: &GuardrailProfile) -> Result<(), DomainError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO guardrail_profiles (name, config, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET config = excluded.config, updated_at = excluded.updated_at",
            params![profile.name(), serde_json::to_string(profile)?, ts(Utc::now())],
        )
        .map_err(|e| DomainError::Database(format!("Failed to save profile: {e}")))?;
        Ok(())
    }

    fn get_profile(&self, name: &str) -> Result<Option<GuardrailProfile>, DomainError> {
        let conn = self.conn()?;
        let config: Option<String> = conn
            .query_row(
                "SELECT config FROM guardrail_profiles WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        config.as_deref().map(parse_profile).transpose()
    }

    fn list_profiles(&self) -> Result<Vec<GuardrailProfile>, DomainError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT config FROM guardrail_profiles ORDER BY name")?;
        let configs = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        configs.iter().map(|c| parse_profile(c)).collect()
    }

    fn set_active(&self, name: &str) -> Result<(), DomainError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let rows = tx.execute(
            "UPDATE guardrail_profiles SET is_active = 1 WHERE name = ?1",
            params![name],
        )?;
        if rows == 0 {
            return Err(DomainError::NotFound(format!("Guardrail profile not found: {name}")));
        }
        tx.execute(
            "UPDATE guardrail_profiles SET is_active = 0 WHERE name != ?1",
            params![name],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn active_profile(&self) -> Result<Option<GuardrailProfile>, DomainError> {
        let conn = self.conn()?;
        let config: Option<String> = conn
            .query_row(
                "SELECT config FROM guardrail_profiles WHERE is_active = 1 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        config.as_deref().map(parse_profile).transpose()
    }
}
