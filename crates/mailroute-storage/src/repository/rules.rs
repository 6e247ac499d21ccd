//! Routing rule repository
//!
//! Rules are created and edited by the administrative CRUD outside this
//! core; the routing engine only ever reads active rules.

use crate::db::DatabasePool;
use crate::models::RoutingRule;
use async_trait::async_trait;
use mailroute_common::{Error, Result};

/// Routing rule repository trait
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// List active rules ordered by priority ascending, ties by id
    async fn list_active(&self) -> Result<Vec<RoutingRule>>;
}

/// PostgreSQL routing rule repository implementation
#[derive(Clone)]
pub struct DbRuleRepository {
    pool: DatabasePool,
}

impl DbRuleRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleRepository for DbRuleRepository {
    async fn list_active(&self) -> Result<Vec<RoutingRule>> {
        sqlx::query_as::<_, RoutingRule>(
            r#"
            SELECT * FROM routing_rules
            WHERE is_active = true
            ORDER BY priority ASC, id ASC
            "#,
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
