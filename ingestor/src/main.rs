use anyhow::Context;
use axum::Router;
use crowd_ingestor::config::{Config, StoreBackend};
use crowd_ingestor::db::PgStore;
use crowd_ingestor::memory::MemoryStore;
use crowd_ingestor::{metrics, rest, seed};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    info!("Starting crowd ingestor");
    info!("HTTP server: {}", config.http_addr);
    info!("Store backend: {:?}", config.backend);

    metrics::init_metrics().context("failed to register metrics")?;

    let app = match config.backend {
        StoreBackend::Postgres => {
            info!("Database: {}", config.redacted_database_url());
            let store = PgStore::connect(&config.database_url, config.db_max_connections)
                .await
                .context("failed to connect to database")?;
            if config.seed_file.is_some() {
                warn!("SEED_FILE is ignored by the postgres backend");
            }
            rest::create_router(store)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store, data is lost on restart");
            let store = MemoryStore::new();
            if let Some(path) = &config.seed_file {
                let fixture = seed::load_seed(path)
                    .with_context(|| format!("failed to read seed file {}", path.display()))?;
                seed::apply_seed(&store, fixture).await?;
            }
            rest::create_router(store)
        }
    };

    serve(&config.http_addr, app).await
}

async fn serve(addr: &str, app: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Received shutdown signal");
    });

    if let Err(e) = server.await {
        error!("HTTP server error: {}", e);
        return Err(e.into());
    }

    info!("Shutting down");
    Ok(())
}
