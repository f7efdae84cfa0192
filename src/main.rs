use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use coupon_dispatch::config::Config;
use coupon_dispatch::handlers::AppState;
use coupon_dispatch::server::Server;
use coupon_dispatch::storage::{self, MemoryStorage, PgStorage, Storage};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Load configuration from environment
    let config =
        Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("coupon_dispatch={},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting coupon dispatch service");
    tracing::info!("Configuration: bind_address={}", config.bind_address);

    // Select the storage backend at startup
    let storage: Arc<dyn Storage> = match &config.database_url {
        Some(url) => {
            let pg = PgStorage::connect(url)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to Postgres: {}", e))?;
            pg.init_schema()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to initialize schema: {}", e))?;
            tracing::info!("Using Postgres storage backend");
            Arc::new(pg)
        }
        None => {
            tracing::info!("Using in-memory storage backend");
            Arc::new(MemoryStorage::new())
        }
    };

    if config.seed_preset_codes {
        let added = storage::seed_preset_codes(storage.as_ref())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to seed coupon pool: {}", e))?;
        if added > 0 {
            tracing::info!("Seeded {} preset coupon codes", added);
        }
    }

    let state = Arc::new(AppState::new(storage, config));

    // Periodically drop expired rate-limit windows
    let rate_limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let pruned = rate_limiter.prune_expired();
            if pruned > 0 {
                tracing::debug!("Pruned {} expired rate-limit windows", pruned);
            }
        }
    });

    // Create and run the server
    Server::new(state)
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
