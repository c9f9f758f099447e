//! Configuration management for IDM Service
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)
//!
//! # Example
//!
//! ```no_run
//! use idm_service::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("JWT issuer: {}", settings.jwt.issuer);
//!     Ok(())
//! }
//! ```

use anyhow::{bail, Context, Result};
use std::env;
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub store: StoreBackend,
    pub database: Option<DatabaseSettings>,
    pub jwt: JwtSettings,
    pub server: ServerSettings,
    pub bootstrap: BootstrapSettings,
    pub revocation: RevocationSettings,
}

impl Settings {
    /// Load settings from environment variables
    ///
    /// A `.env` file is read first in debug builds.
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        Self::from_env()
    }

    fn from_env() -> Result<Self> {
        let store: StoreBackend = env_or("STORE_BACKEND", "postgres")?;
        let database = match store {
            StoreBackend::Postgres => Some(DatabaseSettings::from_env()?),
            StoreBackend::Memory => None,
        };

        Ok(Settings {
            store,
            database,
            jwt: JwtSettings::from_env()?,
            server: ServerSettings::from_env()?,
            bootstrap: BootstrapSettings::from_env(),
            revocation: RevocationSettings::from_env()?,
        })
    }
}

/// Read `key`, falling back to `default`, and parse it
fn env_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {}", key))
}

/// Where accounts and the revocation ledger live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process-local; contents are lost on restart
    Memory,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown store backend '{0}' (expected 'postgres' or 'memory')")]
pub struct UnknownStoreBackend(String);

impl FromStr for StoreBackend {
    type Err = UnknownStoreBackend;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(UnknownStoreBackend(other.to_string())),
        }
    }
}

/// Database connection settings
#[derive(Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", "10")?,
            min_connections: env_or("DATABASE_MIN_CONNECTIONS", "1")?,
            acquire_timeout: env_or("DATABASE_ACQUIRE_TIMEOUT", "5")?,
        })
    }
}

/// Token signing settings
#[derive(Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub expiry_seconds: i64,
}

impl fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("expiry_seconds", &self.expiry_seconds)
            .finish()
    }
}

impl JwtSettings {
    fn from_env() -> Result<Self> {
        let secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if secret.is_empty() {
            bail!("JWT_SECRET must not be empty");
        }

        let expiry_seconds: i64 = env_or("JWT_EXPIRY_SECONDS", "7200")?;
        if expiry_seconds <= 0 {
            bail!("JWT_EXPIRY_SECONDS must be positive");
        }

        Ok(Self {
            secret,
            issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "[::]:50051".to_string()),
            expiry_seconds,
        })
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expiry_seconds)
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Requests served concurrently on one connection
    pub concurrency_limit: usize,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        let concurrency_limit: usize = env_or("SERVER_CONCURRENCY_LIMIT", "10")?;
        if concurrency_limit == 0 {
            bail!("SERVER_CONCURRENCY_LIMIT must be at least 1");
        }

        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("SERVER_PORT", "50051")?,
            concurrency_limit,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Credentials for the first admin account
///
/// Only consulted when the store holds no admin yet.
#[derive(Clone, Default)]
pub struct BootstrapSettings {
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl fmt::Debug for BootstrapSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapSettings")
            .field("admin_email", &self.admin_email)
            .field(
                "admin_password",
                &self.admin_password.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl BootstrapSettings {
    fn from_env() -> Self {
        Self {
            admin_email: env::var("ADMIN_EMAIL").ok().filter(|v| !v.is_empty()),
            admin_password: env::var("ADMIN_PASSWORD").ok().filter(|v| !v.is_empty()),
        }
    }
}

/// Revocation ledger maintenance
#[derive(Debug, Clone)]
pub struct RevocationSettings {
    pub sweep_interval_secs: u64,
}

impl RevocationSettings {
    fn from_env() -> Result<Self> {
        let sweep_interval_secs: u64 = env_or("REVOCATION_SWEEP_INTERVAL_SECS", "600")?;
        if sweep_interval_secs == 0 {
            bail!("REVOCATION_SWEEP_INTERVAL_SECS must be at least 1");
        }
        Ok(Self {
            sweep_interval_secs,
        })
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}
