//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use mailroute_storage::repository::LogStats;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

/// Basic health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall health status
    pub status: String,
}

/// Detailed health response with component checks
#[derive(Debug, Serialize)]
pub struct DetailedHealthResponse {
    /// Overall health status
    pub status: String,
    /// Individual component health checks
    pub checks: HealthChecks,
    /// Lifetime delivery counters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<LogStats>,
    /// Per-account send counters
    pub accounts: Vec<AccountStats>,
}

/// Send counters of one active account
#[derive(Debug, Serialize)]
pub struct AccountStats {
    pub name: String,
    pub sent_today: i32,
    pub total_sent: i64,
}

/// Individual health checks
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Database health status
    pub database: ComponentHealth,
}

/// Individual component health status
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    /// Component status (healthy/unhealthy)
    pub status: String,
    /// Response latency in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Error message if unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Basic health check
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Readiness check (is the service ready to accept requests)
pub async fn readiness(State(state): State<Arc<AppState>>) -> Result<StatusCode, StatusCode> {
    state
        .db_pool
        .health_check()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(StatusCode::OK)
}

/// Detailed health check with delivery counters
pub async fn health_detailed(State(state): State<Arc<AppState>>) -> Json<DetailedHealthResponse> {
    let start = std::time::Instant::now();
    let db_check = state.db_pool.health_check().await;
    let db_latency = start.elapsed().as_millis() as u64;

    let database = match db_check {
        Ok(_) => ComponentHealth {
            status: "healthy".to_string(),
            latency_ms: Some(db_latency),
            error: None,
        },
        Err(e) => ComponentHealth {
            status: "unhealthy".to_string(),
            latency_ms: None,
            error: Some(e.to_string()),
        },
    };

    let stats = state.logs.stats().await.ok();

    let accounts = state
        .accounts
        .list_active()
        .await
        .map(|accounts| {
            accounts
                .into_iter()
                .map(|a| AccountStats {
                    name: a.name,
                    sent_today: a.emails_sent_today,
                    total_sent: a.total_emails_sent,
                })
                .collect()
        })
        .unwrap_or_default();

    let status = if database.status == "healthy" {
        "healthy"
    } else {
        "unhealthy"
    };

    Json(DetailedHealthResponse {
        status: status.to_string(),
        checks: HealthChecks { database },
        stats,
        accounts,
    })
}
