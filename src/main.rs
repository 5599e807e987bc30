/// Flock - social feed backend
///
/// Tweets, retweets, replies, likes and follows over a document store, with
/// timelines assembled and denormalized on read.

mod account;
mod api;
mod auth;
mod config;
mod context;
mod db;
mod error;
mod models;
mod rate_limit;
mod server;
mod social;
mod store;

use config::ServerConfig;
use context::AppContext;
use error::FlockResult;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> FlockResult<()> {
    // Load configuration before logging so the format choice applies
    let config = ServerConfig::from_env()?;

    init_tracing(config.logging.json);

    tracing::info!(
        version = %config.service.version,
        store = ?config.storage.backend,
        "Starting Flock"
    );

    let ctx = AppContext::new(config).await?;

    server::serve(ctx).await?;

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "flock=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
