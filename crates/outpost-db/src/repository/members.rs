//! # Member Repository
//!
//! Writes to the rows that feed `active_keyfobs`. Every mutation here may
//! fire a revision trigger; callers never touch `peering_state` directly.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::{DbError, DbResult};

/// Member to insert.
#[derive(Debug, Clone, Default)]
pub struct NewMember {
    pub name: String,
    pub email: String,
    pub fob_id: Option<i64>,
    pub access_enabled: bool,
    pub discord_user_id: Option<String>,
}

impl NewMember {
    pub fn new(name: impl Into<String>) -> Self {
        NewMember {
            name: name.into(),
            ..Default::default()
        }
    }

    /// A member holding `fob_id`, with access on or off.
    pub fn with_fob(name: impl Into<String>, fob_id: i64, access_enabled: bool) -> Self {
        NewMember {
            name: name.into(),
            fob_id: Some(fob_id),
            access_enabled,
            ..Default::default()
        }
    }

    /// Links a chat account, which makes the member eligible for role sync.
    pub fn discord(mut self, user_id: impl Into<String>) -> Self {
        self.discord_user_id = Some(user_id.into());
        self
    }
}

/// Repository for member rows.
#[derive(Debug, Clone)]
pub struct MemberRepository {
    pool: SqlitePool,
}

impl MemberRepository {
    /// Creates a new MemberRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MemberRepository { pool }
    }

    /// Inserts a member and returns its id.
    pub async fn create(&self, member: &NewMember) -> DbResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO members (name, email, fob_id, access_enabled, discord_user_id)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(member.name.as_str())
        .bind(member.email.as_str())
        .bind(member.fob_id)
        .bind(member.access_enabled)
        .bind(member.discord_user_id.as_deref())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        info!(id, fob_id = ?member.fob_id, "Member created");
        Ok(id)
    }

    /// Turns building access on or off.
    pub async fn set_access(&self, id: i64, enabled: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE members SET access_enabled = ?2 WHERE id = ?1")
            .bind(id)
            .bind(enabled)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Member", id.to_string()));
        }
        info!(id, enabled, "Member access changed");
        Ok(())
    }

    /// Assigns or clears a member's fob.
    pub async fn set_fob(&self, id: i64, fob_id: Option<i64>) -> DbResult<()> {
        let result = sqlx::query("UPDATE members SET fob_id = ?2 WHERE id = ?1")
            .bind(id)
            .bind(fob_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Member", id.to_string()));
        }
        Ok(())
    }

    /// Deletes a member.
    pub async fn delete(&self, id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM members WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns whether the member currently has access, `None` if deleted.
    pub async fn access_enabled(&self, id: i64) -> DbResult<Option<bool>> {
        Ok(
            sqlx::query_scalar("SELECT access_enabled FROM members WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig, StateQuery};

    #[tokio::test]
    async fn test_fob_lifecycle_drives_revision() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let members = db.members();
        let store = db.state_store();

        let id = members.create(&NewMember::with_fob("Ada", 1, true)).await.unwrap();
        assert_eq!(store.current_revision().await.unwrap(), 2);

        members.set_fob(id, Some(2)).await.unwrap();
        assert_eq!(store.current_revision().await.unwrap(), 3);

        members.delete(id).await.unwrap();
        assert_eq!(store.current_revision().await.unwrap(), 4);

        match store.get_state(3).await.unwrap() {
            StateQuery::Changed(snapshot) => assert!(snapshot.enabled_fobs.is_empty()),
            StateQuery::NoChange => panic!("deletion must publish a new revision"),
        }
        assert_eq!(members.access_enabled(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_fob_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.members().create(&NewMember::with_fob("A", 7, true)).await.unwrap();

        let err = db
            .members()
            .create(&NewMember::with_fob("B", 7, true))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_set_access_unknown_member() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.members().set_access(404, true).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
