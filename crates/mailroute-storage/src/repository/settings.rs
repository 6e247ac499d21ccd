//! Mailer settings repository
//!
//! A single-row table written by the administrative CRUD; the core reads
//! it on every dispatch.

use crate::db::DatabasePool;
use crate::models::MailerSettings;
use async_trait::async_trait;
use mailroute_common::{Error, Result};

/// Settings repository trait
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Read the settings singleton, creating it with defaults on first read
    async fn get(&self) -> Result<MailerSettings>;
}

/// PostgreSQL settings repository implementation
#[derive(Clone)]
pub struct DbSettingsRepository {
    pool: DatabasePool,
}

impl DbSettingsRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for DbSettingsRepository {
    async fn get(&self) -> Result<MailerSettings> {
        let existing =
            sqlx::query_as::<_, MailerSettings>("SELECT * FROM mailer_settings WHERE id = 1")
                .fetch_optional(self.pool.pool())
                .await
                .map_err(|e| Error::Database(e.to_string()))?;

        if let Some(settings) = existing {
            return Ok(settings);
        }

        let defaults = MailerSettings::default();

        sqlx::query(
            r#"
            INSERT INTO mailer_settings
                (id, enable_open_tracking, enable_link_tracking, tracking_base_url,
                 enable_unsubscribe_header)
            VALUES (1, $1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(defaults.enable_open_tracking)
        .bind(defaults.enable_link_tracking)
        .bind(&defaults.tracking_base_url)
        .bind(defaults.enable_unsubscribe_header)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        // A concurrent first read may have inserted the row; read back
        // whatever won.
        sqlx::query_as::<_, MailerSettings>("SELECT * FROM mailer_settings WHERE id = 1")
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
