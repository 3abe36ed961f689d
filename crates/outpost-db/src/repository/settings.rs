//! Key/value integration settings (webhook URLs, chat bot credentials).

use sqlx::SqlitePool;

use crate::error::DbResult;

/// Repository for `integration_settings`.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    /// Every setting, ordered by key.
    pub async fn all(&self) -> DbResult<Vec<(String, String)>> {
        Ok(
            sqlx::query_as("SELECT key, value FROM integration_settings ORDER BY key")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// Inserts or replaces a setting.
    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO integration_settings (key, value) VALUES (?1, ?2)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM integration_settings WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
