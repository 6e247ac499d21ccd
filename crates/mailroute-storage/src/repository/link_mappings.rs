//! Link mapping repository

use crate::db::DatabasePool;
use crate::models::LinkMapping;
use async_trait::async_trait;
use mailroute_common::types::EmailLogId;
use mailroute_common::{Error, Result};
use uuid::Uuid;

/// Link mapping repository trait
#[async_trait]
pub trait LinkMappingRepository: Send + Sync {
    /// Store the mapping for one rewritten URL.
    ///
    /// Unique per (email_log_id, link_hash); a hash collision within one
    /// message is last-write-wins.
    async fn upsert(&self, email_log_id: EmailLogId, link_hash: &str, url: &str) -> Result<()>;

    /// Look up a mapping without side effects
    async fn get(&self, email_log_id: EmailLogId, link_hash: &str)
        -> Result<Option<LinkMapping>>;

    /// Resolve a link for redirection, counting the click.
    ///
    /// Every resolution counts: click_count increments, last_clicked_at
    /// moves forward, first_clicked_at is set only once. Returns the
    /// original URL if the mapping exists.
    async fn resolve_and_count(
        &self,
        email_log_id: EmailLogId,
        link_hash: &str,
    ) -> Result<Option<String>>;
}

/// PostgreSQL link mapping repository implementation
#[derive(Clone)]
pub struct DbLinkMappingRepository {
    pool: DatabasePool,
}

impl DbLinkMappingRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LinkMappingRepository for DbLinkMappingRepository {
    async fn upsert(&self, email_log_id: EmailLogId, link_hash: &str, url: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO link_mappings (id, email_log_id, link_hash, original_url)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email_log_id, link_hash)
            DO UPDATE SET original_url = EXCLUDED.original_url
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email_log_id)
        .bind(link_hash)
        .bind(url)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn get(
        &self,
        email_log_id: EmailLogId,
        link_hash: &str,
    ) -> Result<Option<LinkMapping>> {
        sqlx::query_as::<_, LinkMapping>(
            "SELECT * FROM link_mappings WHERE email_log_id = $1 AND link_hash = $2",
        )
        .bind(email_log_id)
        .bind(link_hash)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn resolve_and_count(
        &self,
        email_log_id: EmailLogId,
        link_hash: &str,
    ) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            UPDATE link_mappings
            SET click_count = click_count + 1,
                first_clicked_at = COALESCE(first_clicked_at, NOW()),
                last_clicked_at = NOW()
            WHERE email_log_id = $1 AND link_hash = $2
            RETURNING original_url
            "#,
        )
        .bind(email_log_id)
        .bind(link_hash)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(row.map(|(url,)| url))
    }
}
