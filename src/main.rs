mod aggregate;
mod api;
mod cache;
mod collect;
mod config;
mod fetch;
mod models;
mod rank;
mod scheduler;
mod score;
mod store;
mod tokenize;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use crate::aggregate::Aggregator;
use crate::api::AppState;
use crate::cache::{MemoryCache, TrendCache};
use crate::config::Config;
use crate::fetch::Fetcher;
use crate::score::Scorer;
use crate::store::{FsTrendStore, TrendStore};

/// GDELT GKG trend ingestion, aggregation and scoring service
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Listen port (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Trend document directory (overrides TRENDS_DATA_DIR)
    #[arg(short, long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_line_number(true)
        .init();

    info!("Starting gkg-trends");

    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = dir.into();
    }
    config.log();
    let config = Arc::new(config);

    let store: Arc<dyn TrendStore> = Arc::new(FsTrendStore::new(config.data_dir.clone())?);
    let cache: Arc<dyn TrendCache> = Arc::new(MemoryCache::new(config.cache_capacity));
    let aggregator = Aggregator::new(Arc::clone(&store), Arc::clone(&cache), Arc::clone(&config));
    let fetcher = Arc::new(Fetcher::new(Arc::clone(&config), aggregator.clone())?);
    let scorer = Scorer::new(Arc::clone(&store), Arc::clone(&fetcher), Arc::clone(&config));

    scheduler::start_realtime_job(Arc::clone(&fetcher), config.realtime_interval_min);
    scheduler::start_daily_job(Arc::clone(&fetcher), aggregator, config.daily_hour_utc);

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        store,
        cache,
        fetcher,
        scorer,
    });
    let app = api::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
