//! # API Token Repository
//!
//! Bearer tokens accepted by the authority's HTTP API.

use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DbResult;

/// Repository for `api_tokens`.
#[derive(Debug, Clone)]
pub struct TokenRepository {
    pool: SqlitePool,
}

impl TokenRepository {
    /// Creates a new TokenRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TokenRepository { pool }
    }

    /// Generates, stores and returns a fresh token.
    pub async fn issue(&self, label: &str) -> DbResult<String> {
        let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());

        sqlx::query("INSERT INTO api_tokens (token, label) VALUES (?1, ?2)")
            .bind(token.as_str())
            .bind(label)
            .execute(&self.pool)
            .await?;

        info!(label, "Issued API token");
        Ok(token)
    }

    /// Returns true if the token exists, recording its use.
    pub async fn verify(&self, token: &str) -> DbResult<bool> {
        if token.is_empty() {
            return Ok(false);
        }

        let result = sqlx::query("UPDATE api_tokens SET last_used = unixepoch() WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        let known = result.rows_affected() > 0;
        if !known {
            debug!("Rejected unknown API token");
        }
        Ok(known)
    }

    /// Removes a token. Returns false if it did not exist.
    pub async fn revoke(&self, token: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM api_tokens WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of stored tokens.
    pub async fn count(&self) -> DbResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM api_tokens")
            .fetch_one(&self.pool)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_issue_verify_revoke() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tokens = db.tokens();
        assert_eq!(tokens.count().await.unwrap(), 0);

        let token = tokens.issue("edge-1").await.unwrap();
        assert_eq!(token.len(), 64);
        assert!(tokens.verify(&token).await.unwrap());
        assert!(!tokens.verify("nope").await.unwrap());
        assert!(!tokens.verify("").await.unwrap());

        assert!(tokens.revoke(&token).await.unwrap());
        assert!(!tokens.verify(&token).await.unwrap());
    }
}
