/**
 * Server Configuration
 *
 * # Configuration Sources
 *
 * Lowest to highest precedence:
 * 1. Built-in defaults (in-memory store, port 3000)
 * 2. A TOML file named by `FAILFIXES_CONFIG`
 * 3. Environment variables, including those loaded from `.env`
 *
 * | Variable | Field |
 * |---|---|
 * | `BIND_ADDR` / `SERVER_PORT` | `bind_addr` |
 * | `DATABASE_URL` | `database_url` |
 * | `JWT_SECRET` | `jwt_secret` |
 * | `STORE_TIMEOUT_MS` | `store_timeout_ms` |
 * | `MAX_MESSAGE_LEN` | `max_message_len` |
 * | `ALLOWED_ORIGINS` | `allowed_origins` (comma separated) |
 * | `OUTBOUND_QUEUE_LEN` | `outbound_queue_len` |
 * | `PROVISION_USERS` | `provision_users` |
 *
 * # Users
 *
 * Accounts are issued by whoever signs the tokens. Users listed under
 * `[[users]]` in the TOML file are added to the directory at startup. With
 * `provision_users` on, any validly signed token is also accepted and its
 * subject added on first use; it defaults to on exactly when no database is
 * configured, so a bare development server is usable out of the box.
 *
 * ```toml
 * [[users]]
 * id = "7c0e4a9e-6a55-4c1e-9d86-5d3c1d1b2f10"
 * username = "ada"
 * display_name = "Ada Lovelace"
 * ```
 *
 * # Database
 *
 * When `database_url` is set, `load_database` connects and runs the
 * migrations in `migrations/`. Without it the server runs on the in-memory
 * store, which is fine for development and tests.
 */

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::backend::auth::UserIdentity;
use crate::backend::chat::DEFAULT_MAX_MESSAGE_LEN;
use crate::backend::realtime::DEFAULT_QUEUE_CAPACITY;

pub const CONFIG_PATH_VAR: &str = "FAILFIXES_CONFIG";
const DEV_JWT_SECRET: &str = "failfixes-dev-secret-change-in-production";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidVar { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub store_timeout_ms: u64,
    pub max_message_len: usize,
    pub allowed_origins: Vec<String>,
    pub outbound_queue_len: usize,
    /// Unset means "on without a database, off with one"
    pub provision_users: Option<bool>,
    pub users: Vec<SeedUser>,
}

/// A user added to the directory at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedUser {
    pub id: Uuid,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl SeedUser {
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.id,
            username: self.username.clone(),
            display_name: self
                .display_name
                .clone()
                .unwrap_or_else(|| self.username.clone()),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            database_url: None,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            allowed_origins: Vec::new(),
            outbound_queue_len: DEFAULT_QUEUE_CAPACITY,
            provision_users: None,
            users: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Load defaults, then the TOML file from `FAILFIXES_CONFIG`, then the
    /// environment. `.env` is read first if present.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::from_toml_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;

        if config.jwt_secret == DEV_JWT_SECRET {
            tracing::warn!("[Server] JWT_SECRET not set, using the development secret");
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay values found by `lookup` (normally `std::env::var`)
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(addr) = lookup("BIND_ADDR") {
            self.bind_addr = parse_var("BIND_ADDR", &addr)?;
        } else if let Some(port) = lookup("SERVER_PORT") {
            let port: u16 = parse_var("SERVER_PORT", &port)?;
            self.bind_addr.set_port(port);
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = Some(url).filter(|url| !url.trim().is_empty());
        }
        if let Some(secret) = lookup("JWT_SECRET") {
            self.jwt_secret = secret;
        }
        if let Some(timeout) = lookup("STORE_TIMEOUT_MS") {
            self.store_timeout_ms = parse_var("STORE_TIMEOUT_MS", &timeout)?;
        }
        if let Some(max_len) = lookup("MAX_MESSAGE_LEN") {
            self.max_message_len = parse_var("MAX_MESSAGE_LEN", &max_len)?;
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(len) = lookup("OUTBOUND_QUEUE_LEN") {
            self.outbound_queue_len = parse_var("OUTBOUND_QUEUE_LEN", &len)?;
        }
        if let Some(provision) = lookup("PROVISION_USERS") {
            self.provision_users = Some(parse_var("PROVISION_USERS", &provision)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("jwt_secret cannot be empty"));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::Invalid("store_timeout_ms must be positive"));
        }
        if self.max_message_len == 0 {
            return Err(ConfigError::Invalid("max_message_len must be positive"));
        }
        if self.outbound_queue_len == 0 {
            return Err(ConfigError::Invalid("outbound_queue_len must be positive"));
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Whether validly signed tokens for unknown users are accepted
    pub fn provisions_users(&self) -> bool {
        self.provision_users.unwrap_or(self.database_url.is_none())
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidVar {
        key,
        value: value.to_string(),
    })
}

/// Programmatic construction, mostly for tests
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.config.bind_addr = bind_addr;
        self
    }

    pub fn database_url(mut self, database_url: impl Into<String>) -> Self {
        self.config.database_url = Some(database_url.into());
        self
    }

    pub fn jwt_secret(mut self, jwt_secret: impl Into<String>) -> Self {
        self.config.jwt_secret = jwt_secret.into();
        self
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.config.store_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn max_message_len(mut self, max_message_len: usize) -> Self {
        self.config.max_message_len = max_message_len;
        self
    }

    pub fn allowed_origin(mut self, origin: impl Into<String>) -> Self {
        self.config.allowed_origins.push(origin.into());
        self
    }

    pub fn outbound_queue_len(mut self, len: usize) -> Self {
        self.config.outbound_queue_len = len;
        self
    }

    pub fn provision_users(mut self, provision: bool) -> Self {
        self.config.provision_users = Some(provision);
        self
    }

    pub fn seed_user(mut self, user: SeedUser) -> Self {
        self.config.users.push(user);
        self
    }

    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Connect to PostgreSQL and run migrations
///
/// # Errors
///
/// Connection or migration failures are returned; the caller decides whether
/// to fall back or abort. Unlike a missing `database_url`, a configured but
/// unreachable database is treated as fatal at startup.
pub async fn load_database(database_url: &str) -> Result<PgPool, sqlx::Error> {
    tracing::info!("[Server] Connecting to database...");
    let pool = PgPool::connect(database_url).await?;
    tracing::info!("[Server] Database connection pool created");

    tracing::info!("[Server] Running database migrations...");
    sqlx::migrate!().run(&pool).await?;
    tracing::info!("[Server] Database migrations completed");

    Ok(pool)
}
