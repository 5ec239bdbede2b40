use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use avgpay_api::{router, AppConfig, AppState};
use avgpay_db::{log_pool_metrics, Database, MemoryStore, PoolConfig};
use avgpay_inference::{ChainConfig, FallbackClient};
use avgpay_jobs::EnrichmentEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "avgpay_api=debug,avgpay_jobs=info,...")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "avgpay_api=debug,avgpay_jobs=info,avgpay_inference=info,avgpay_db=info,tower_http=debug"
            .into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("avgpay-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = AppConfig::from_env();
    if config.secrets().is_empty() {
        if config.is_production() {
            warn!("CRON_SECRET and ENRICHMENT_API_SECRET are unset; protected routes will reject all requests");
        } else {
            warn!("No enrichment secret configured; protected routes are open outside production");
        }
    }

    let chain = ChainConfig::from_env()?;
    let llm = Arc::new(FallbackClient::from_config(&chain)?);
    info!(chain = ?llm.labels(), "Model fallback chain configured");

    let state = if config.uses_memory_store() {
        warn!("DATABASE_URL=memory; enrichment state is not persisted");
        let store = Arc::new(MemoryStore::new());
        AppState::new(config.clone(), store.clone(), store.clone(), store, llm)
    } else {
        info!("Connecting to database...");
        let db =
            Database::connect_with_config(&config.database_url, PoolConfig::from_env()).await?;
        info!("Database connected");
        tokio::spawn(log_pool_metrics_periodically(db.clone()));

        if config.run_migrations {
            info!("Running database migrations...");
            db.migrate().await?;
            info!("Database migrations complete");
        }

        AppState::new(
            config.clone(),
            Arc::new(db.queue.clone()),
            Arc::new(db.entities.clone()),
            Arc::new(db.market.clone()),
            llm,
        )
    };

    // Log processor events
    let mut events = state.processor.events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(EnrichmentEvent::JobStarted {
                    job_id,
                    entity_type,
                    entity_name,
                }) => {
                    info!(%job_id, %entity_type, entity_name = %entity_name, "Job started");
                }
                Ok(EnrichmentEvent::JobCompleted {
                    job_id,
                    entity_type,
                    provider,
                    model,
                    duration_ms,
                }) => {
                    info!(%job_id, %entity_type, %provider, %model, duration_ms, "Job completed");
                }
                Ok(EnrichmentEvent::JobFailed {
                    job_id,
                    entity_type,
                    error,
                }) => {
                    warn!(%job_id, %entity_type, error = %error, "Job failed");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

/// Log pool occupancy once a minute.
async fn log_pool_metrics_periodically(db: Database) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
    loop {
        interval.tick().await;
        log_pool_metrics(db.pool());
    }
}
