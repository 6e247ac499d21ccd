//! Email log repository

use crate::db::DatabasePool;
use crate::models::{CreateEmailEvent, CreateEmailLog, EmailLog, EmailLogStatus};
use async_trait::async_trait;
use mailroute_common::types::{AccountId, EmailLogId};
use mailroute_common::{Error, Result};
use serde::Serialize;
use uuid::Uuid;

/// Aggregate log statistics
#[derive(Debug, Clone, Serialize)]
pub struct LogStats {
    pub total: i64,
    pub sent: i64,
    pub failed: i64,
    pub total_opens: i64,
    pub total_clicks: i64,
}

/// Email log repository trait
#[async_trait]
pub trait EmailLogRepository: Send + Sync {
    /// Create the log row for an outbound message
    async fn create(&self, input: CreateEmailLog) -> Result<EmailLog>;

    /// Resolve a log row through its opaque tracking token.
    ///
    /// This is the only lookup the tracking callbacks may use; numeric
    /// row ids are never accepted from the outside.
    async fn get_by_email_id(&self, email_id: &str) -> Result<Option<EmailLog>>;

    /// Mark a log row as sent, through the given account or the fallback
    /// transport (no account)
    async fn mark_sent(&self, id: EmailLogId, account_id: Option<AccountId>) -> Result<()>;

    /// Mark a log row as failed
    async fn mark_failed(&self, id: EmailLogId, error: &str) -> Result<()>;

    /// Increment the open counter and opened-at timestamps
    async fn record_open(&self, id: EmailLogId) -> Result<()>;

    /// Increment the click counter
    async fn record_click(&self, id: EmailLogId) -> Result<()>;

    /// Append a tracking event
    async fn add_event(&self, input: CreateEmailEvent) -> Result<()>;

    /// Bulk-purge logs older than the given number of days.
    ///
    /// Events and link mappings cascade; this is the only path that
    /// deletes them.
    async fn purge_older_than(&self, days: i64) -> Result<u64>;

    /// Aggregate statistics over all log rows
    async fn stats(&self) -> Result<LogStats>;
}

/// PostgreSQL email log repository implementation
#[derive(Clone)]
pub struct DbEmailLogRepository {
    pool: DatabasePool,
}

impl DbEmailLogRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmailLogRepository for DbEmailLogRepository {
    async fn create(&self, input: CreateEmailLog) -> Result<EmailLog> {
        sqlx::query_as::<_, EmailLog>(
            r#"
            INSERT INTO email_logs (id, email_id, recipient, subject, template_id, status, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.email_id)
        .bind(&input.recipient)
        .bind(&input.subject)
        .bind(input.template_id)
        .bind(EmailLogStatus::Pending.as_str())
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get_by_email_id(&self, email_id: &str) -> Result<Option<EmailLog>> {
        sqlx::query_as::<_, EmailLog>("SELECT * FROM email_logs WHERE email_id = $1")
            .bind(email_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_sent(&self, id: EmailLogId, account_id: Option<AccountId>) -> Result<()> {
        sqlx::query(
            "UPDATE email_logs SET status = $2, account_id = $3, error = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(EmailLogStatus::Sent.as_str())
        .bind(account_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn mark_failed(&self, id: EmailLogId, error: &str) -> Result<()> {
        sqlx::query("UPDATE email_logs SET status = $2, error = $3 WHERE id = $1")
            .bind(id)
            .bind(EmailLogStatus::Failed.as_str())
            .bind(error)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn record_open(&self, id: EmailLogId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE email_logs
            SET open_count = open_count + 1,
                first_opened_at = COALESCE(first_opened_at, NOW()),
                last_opened_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn record_click(&self, id: EmailLogId) -> Result<()> {
        sqlx::query("UPDATE email_logs SET click_count = click_count + 1 WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn add_event(&self, input: CreateEmailEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO email_events (id, email_log_id, event_type, ip_address, user_agent, link_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.email_log_id)
        .bind(input.event_type.as_str())
        .bind(&input.ip_address)
        .bind(&input.user_agent)
        .bind(&input.link_url)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn purge_older_than(&self, days: i64) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM email_logs WHERE sent_at < NOW() - ($1 * INTERVAL '1 day')")
                .bind(days)
                .execute(self.pool.pool())
                .await
                .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<LogStats> {
        let row: (i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status = 'sent'),
                   COUNT(*) FILTER (WHERE status = 'failed'),
                   COALESCE(SUM(open_count), 0)::BIGINT,
                   COALESCE(SUM(click_count), 0)::BIGINT
            FROM email_logs
            "#,
        )
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(LogStats {
            total: row.0,
            sent: row.1,
            failed: row.2,
            total_opens: row.3,
            total_clicks: row.4,
        })
    }
}
