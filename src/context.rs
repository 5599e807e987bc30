/// Application context and dependency injection
use crate::{
    account::AccountManager,
    config::{ServerConfig, StoreBackend},
    db::DatabaseOptions,
    error::FlockResult,
    rate_limit::RateLimiter,
    social::SocialGraph,
    store::{MemoryRecordStore, RecordStore, SqliteRecordStore},
};
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn RecordStore>,
    pub social: Arc<SocialGraph>,
    pub account_manager: Arc<AccountManager>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> FlockResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let store: Arc<dyn RecordStore> = match &config.storage.backend {
            StoreBackend::Sqlite {
                path,
                max_connections,
            } => {
                let options = DatabaseOptions {
                    max_connections: *max_connections,
                    ..DatabaseOptions::default()
                };
                Arc::new(SqliteRecordStore::open(path, options).await?)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using the in-memory record store; data is lost on exit");
                Arc::new(MemoryRecordStore::new())
            }
        };

        Ok(Self::with_store(config, store))
    }

    /// Wire every service over an already-open store
    pub fn with_store(config: ServerConfig, store: Arc<dyn RecordStore>) -> Self {
        let config = Arc::new(config);

        let social = SocialGraph::new(store.clone(), config.feed.clone());
        let account_manager = AccountManager::new(store.clone(), social.identity.clone(), config.clone());
        let rate_limiter = RateLimiter::new(config.rate_limit.clone());

        Self {
            config,
            store,
            social: Arc::new(social),
            account_manager: Arc::new(account_manager),
            rate_limiter: Arc::new(rate_limiter),
        }
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> FlockResult<()> {
        if let StoreBackend::Sqlite { .. } = config.storage.backend {
            tokio::fs::create_dir_all(&config.storage.data_directory).await?;
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
