/// Configuration management for Flock
use crate::error::{FlockError, FlockResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub feed: FeedConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub backend: StoreBackend,
}

/// Which record store implementation backs the service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreBackend {
    Sqlite { path: PathBuf, max_connections: u32 },
    Memory,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Lifetime of issued access tokens, in seconds
    pub token_ttl: i64,
}

/// Feed pagination and materialization limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub default_count: usize,
    pub max_count: usize,
    /// Upper bound on posts materialized at once for a single feed page
    pub materialize_concurrency: usize,
    pub search_limit: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_count: 20,
            max_count: 100,
            materialize_concurrency: 16,
            search_limit: 10,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub anonymous_rps: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            authenticated_rps: 50,
            anonymous_rps: 10,
            burst_size: 25,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

/// Read an env var and parse it, falling back to `default` when unset or malformed
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> FlockResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("FLOCK_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("FLOCK_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| FlockError::Validation("Invalid port number".to_string()))?;
        let version = env::var("FLOCK_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let data_directory: PathBuf = env::var("FLOCK_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();

        let backend = match env::var("FLOCK_STORE").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            Ok("sqlite") | Err(_) => StoreBackend::Sqlite {
                path: env::var("FLOCK_DB_LOCATION")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| data_directory.join("flock.sqlite")),
                max_connections: env_or("FLOCK_DB_MAX_CONNECTIONS", 10),
            },
            Ok(other) => {
                return Err(FlockError::Validation(format!(
                    "Unknown store backend: {}",
                    other
                )))
            }
        };

        let jwt_secret = env::var("FLOCK_JWT_SECRET")
            .map_err(|_| FlockError::Validation("JWT secret required".to_string()))?;
        let token_ttl = env_or("FLOCK_TOKEN_TTL", 7 * 24 * 3600);

        let feed_defaults = FeedConfig::default();
        let feed = FeedConfig {
            default_count: env_or("FLOCK_FEED_DEFAULT_COUNT", feed_defaults.default_count),
            max_count: env_or("FLOCK_FEED_MAX_COUNT", feed_defaults.max_count),
            materialize_concurrency: env_or(
                "FLOCK_FEED_MATERIALIZE_CONCURRENCY",
                feed_defaults.materialize_concurrency,
            ),
            search_limit: env_or("FLOCK_SEARCH_LIMIT", feed_defaults.search_limit),
        };

        let rate_defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            enabled: env_or("FLOCK_RATE_LIMITS_ENABLED", rate_defaults.enabled),
            authenticated_rps: env_or("FLOCK_RATE_LIMIT_AUTH_RPS", rate_defaults.authenticated_rps),
            anonymous_rps: env_or("FLOCK_RATE_LIMIT_ANON_RPS", rate_defaults.anonymous_rps),
            burst_size: env_or("FLOCK_RATE_LIMIT_BURST", rate_defaults.burst_size),
        };

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let log_json = env::var("FLOCK_LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                backend,
            },
            authentication: AuthConfig {
                jwt_secret,
                token_ttl,
            },
            feed,
            rate_limit,
            logging: LoggingConfig {
                level: log_level,
                json: log_json,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> FlockResult<()> {
        if self.service.hostname.is_empty() {
            return Err(FlockError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(FlockError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.token_ttl <= 0 {
            return Err(FlockError::Validation("Token TTL must be positive".to_string()));
        }

        if self.feed.max_count == 0 || self.feed.default_count == 0 {
            return Err(FlockError::Validation(
                "Feed counts must be at least 1".to_string(),
            ));
        }

        if self.feed.materialize_concurrency == 0 {
            return Err(FlockError::Validation(
                "Materialization concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration used by unit tests: in-memory store, fixed secret
    #[cfg(test)]
    pub fn for_tests() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8000,
                version: "0.1.0".to_string(),
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                backend: StoreBackend::Memory,
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-key-for-testing-only".to_string(),
                token_ttl: 3600,
            },
            feed: FeedConfig::default(),
            rate_limit: RateLimitConfig {
                enabled: false,
                ..RateLimitConfig::default()
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
        }
    }
}
