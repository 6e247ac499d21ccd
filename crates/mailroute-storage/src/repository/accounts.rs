//! Sending account repository

use crate::db::DatabasePool;
use crate::models::SenderAccount;
use async_trait::async_trait;
use mailroute_common::types::AccountId;
use mailroute_common::{Error, Result};

/// Sending account repository trait
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// List active accounts ordered by priority, ties by id ascending
    async fn list_active(&self) -> Result<Vec<SenderAccount>>;

    /// Get an account by its unique name
    async fn get_by_name(&self, name: &str) -> Result<Option<SenderAccount>>;

    /// Get an account by id
    async fn get(&self, id: AccountId) -> Result<Option<SenderAccount>>;

    /// Increment the send counters for one account.
    ///
    /// A single UPDATE so concurrent sends on the same account cannot
    /// lose increments.
    async fn record_send(&self, id: AccountId) -> Result<()>;

    /// Zero the hourly counter for every account
    async fn reset_hourly(&self) -> Result<u64>;

    /// Zero the daily and hourly counters for every account
    async fn reset_daily(&self) -> Result<u64>;
}

/// PostgreSQL account repository implementation
#[derive(Clone)]
pub struct DbAccountRepository {
    pool: DatabasePool,
}

impl DbAccountRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for DbAccountRepository {
    async fn list_active(&self) -> Result<Vec<SenderAccount>> {
        sqlx::query_as::<_, SenderAccount>(
            r#"
            SELECT * FROM sender_accounts
            WHERE is_active = true
            ORDER BY priority ASC, id ASC
            "#,
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<SenderAccount>> {
        sqlx::query_as::<_, SenderAccount>("SELECT * FROM sender_accounts WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: AccountId) -> Result<Option<SenderAccount>> {
        sqlx::query_as::<_, SenderAccount>("SELECT * FROM sender_accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn record_send(&self, id: AccountId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sender_accounts
            SET emails_sent_today = emails_sent_today + 1,
                emails_sent_this_hour = emails_sent_this_hour + 1,
                total_emails_sent = total_emails_sent + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn reset_hourly(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE sender_accounts SET emails_sent_this_hour = 0, updated_at = NOW()",
        )
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn reset_daily(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sender_accounts
            SET emails_sent_today = 0,
                emails_sent_this_hour = 0,
                updated_at = NOW()
            "#,
        )
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
