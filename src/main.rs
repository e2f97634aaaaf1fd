use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod collector;
mod comed;
mod config;
mod date;
mod metrics;
mod routes;
mod scheduler;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<collector::PriceCache>,
    pub config: config::Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;

    let cache = Arc::new(collector::PriceCache::new(config.collector_options()));
    let client = comed::ComedClient::new(&config)?;

    scheduler::spawn(
        cache.clone(),
        client,
        Duration::from_secs(config.refresh_interval_secs),
    );
    info!(
        "Background refresh started (every {}s)",
        config.refresh_interval_secs
    );

    let state = AppState {
        cache,
        config: config.clone(),
    };

    let app = Router::new()
        .route("/metrics", get(routes::metrics::handler))
        .route("/health", get(routes::health::handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
