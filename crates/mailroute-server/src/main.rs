//! Mailroute - delivery service entry point

use anyhow::Result;
use mailroute_api::AppState;
use mailroute_common::config::Config;
use mailroute_core::{
    CredentialVault, DeliveryDispatcher, FallbackTransport, QuotaLedger, ResetScheduler,
    RoutingEngine, SmtpTransport, SmtpTransportFactory, SystemClock, TrackingCodec,
};
use mailroute_storage::db::DatabasePool;
use mailroute_storage::repository::{
    AccountRepository, EmailLogRepository, LinkMappingRepository, RuleRepository,
    SettingsRepository,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging.filter);

    info!("Starting Mailroute delivery service...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;
    info!("Database connection established");

    // Run migrations
    db_pool.migrate().await?;
    info!("Database migrations completed");

    // Repositories
    let accounts = Arc::new(AccountRepository::new(db_pool.clone()));
    let rules = Arc::new(RuleRepository::new(db_pool.clone()));
    let logs = Arc::new(EmailLogRepository::new(db_pool.clone()));
    let links = Arc::new(LinkMappingRepository::new(db_pool.clone()));
    let settings = Arc::new(SettingsRepository::new(db_pool.clone()));

    // Delivery engine
    let routing = RoutingEngine::new(accounts.clone(), rules.clone());
    let quota = QuotaLedger::new(accounts.clone());
    let vault = CredentialVault::new(config.secrets.credential_key.clone());
    let codec = TrackingCodec::new(config.secrets.tracking.clone(), logs.clone(), links.clone());
    let factory = Arc::new(SmtpTransportFactory::new(config.server.hostname.clone()));

    let mut dispatcher = DeliveryDispatcher::new(
        logs.clone(),
        settings,
        routing,
        quota.clone(),
        vault,
        codec.clone(),
        factory,
    );

    if let Some(fallback) = &config.fallback_smtp {
        let transport = SmtpTransport::from_fallback_config(fallback, &config.server.hostname)?;
        dispatcher = dispatcher.with_fallback(FallbackTransport {
            transport: Arc::new(transport),
            from_email: fallback.from_email.clone(),
            from_name: fallback.from_name.clone(),
        });
        info!("Fallback SMTP transport configured for {}", fallback.host);
    }

    // Start quota reset scheduler
    let mut scheduler = ResetScheduler::new(quota, Arc::new(SystemClock));
    if let Some(days) = config.retention.email_log_days {
        scheduler = scheduler.with_log_retention(logs.clone(), days);
        info!("Email logs retained for {} days", days);
    }
    scheduler.start();

    // Start API server
    let state = Arc::new(AppState {
        db_pool,
        dispatcher,
        codec,
        logs,
        accounts,
    });
    let app = mailroute_api::create_router(state);
    let addr = format!("{}:{}", config.server.bind_address, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);

    let api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    info!("Mailroute started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    api_handle.abort();
    scheduler.stop();

    info!("Mailroute shutdown complete");

    Ok(())
}

fn init_logging(filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter.to_string()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
