//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Poll store configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Admin token verification.
    pub auth: AuthConfig,
    /// Per-connection rate limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Poll session tuning.
    #[serde(default)]
    pub sessions: SessionConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Which poll store backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// `PostgreSQL` through sea-orm.
    Postgres,
    /// In-process store; state is lost on restart.
    Memory,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Store backend.
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    /// `PostgreSQL` connection URL (ignored for the memory backend).
    #[serde(default)]
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Admin token verification configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret the admin JWTs are signed with.
    pub jwt_secret: String,
    /// Expected `iss` claim, if any.
    #[serde(default)]
    pub issuer: Option<String>,
}

/// Sliding-window limits, applied per connection.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum `joinPoll` attempts per window.
    #[serde(default = "default_join_max")]
    pub join_max: u32,
    /// Join window length in seconds.
    #[serde(default = "default_window_secs")]
    pub join_window_secs: u64,
    /// Maximum `vote` attempts per window.
    #[serde(default = "default_vote_max")]
    pub vote_max: u32,
    /// Vote window length in seconds.
    #[serde(default = "default_window_secs")]
    pub vote_window_secs: u64,
}

/// Poll session tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// How many session codes to try before giving up on a poll creation.
    #[serde(default = "default_code_max_attempts")]
    pub code_max_attempts: u32,
    /// Outbound queue depth per connection.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Longest poll duration an admin may request, in seconds.
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: i64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_backend() -> StoreBackend {
    StoreBackend::Postgres
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

const fn default_join_max() -> u32 {
    10
}

const fn default_vote_max() -> u32 {
    30
}

const fn default_window_secs() -> u64 {
    60
}

const fn default_code_max_attempts() -> u32 {
    10
}

const fn default_outbound_buffer() -> usize {
    256
}

const fn default_max_duration_secs() -> i64 {
    7 * 24 * 60 * 60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            join_max: default_join_max(),
            join_window_secs: default_window_secs(),
            vote_max: default_vote_max(),
            vote_window_secs: default_window_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            code_max_attempts: default_code_max_attempts(),
            outbound_buffer: default_outbound_buffer(),
            max_duration_secs: default_max_duration_secs(),
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `LIVEPOLL_ENV`)
    /// 3. Environment variables with `LIVEPOLL_` prefix, `__` between
    ///    sections (e.g. `LIVEPOLL_AUTH__JWT_SECRET`)
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("LIVEPOLL_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("LIVEPOLL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("LIVEPOLL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
