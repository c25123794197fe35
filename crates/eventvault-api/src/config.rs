//! Server configuration read from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use eventvault_engine::EventstoreOptions;

use crate::error::AppError;

/// Storage backend selected by `STORAGE_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Process-local adapter; data is lost on exit.
    InMemory,
    /// `PostgreSQL` adapter; needs `DATABASE_URL`.
    Postgres,
}

impl FromStr for StorageKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "inmemory" | "memory" => Ok(Self::InMemory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(AppError::Config(format!(
                "STORAGE_TYPE must be `inmemory` or `postgres`, got `{other}`"
            ))),
        }
    }
}

/// Settings of the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Storage backend.
    pub storage: StorageKind,
    /// Connection string for the postgres backend.
    pub database_url: Option<String>,
    /// Pool size for the postgres backend.
    pub database_max_connections: u32,
    /// Run the dispatcher with the logging publisher.
    pub dispatch_enabled: bool,
    /// Dispatcher poll interval.
    pub dispatch_interval: Duration,
    /// Bound on the initial storage connect.
    pub connect_timeout: Duration,
    /// Snapshots kept per stream.
    pub max_snapshots_count: Option<usize>,
}

fn parse<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
    }
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is invalid or a required one
    /// is missing.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of
    /// a variable if it is set.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is invalid or a required one
    /// is missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let storage = parse("STORAGE_TYPE", lookup("STORAGE_TYPE"), StorageKind::InMemory)?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());
        if storage == StorageKind::Postgres && database_url.is_none() {
            return Err(AppError::Config(
                "DATABASE_URL environment variable must be set for the postgres backend".into(),
            ));
        }

        let max_snapshots_count = lookup("MAX_SNAPSHOTS_COUNT")
            .map(|raw| parse("MAX_SNAPSHOTS_COUNT", Some(raw), 0_usize))
            .transpose()?;
        if max_snapshots_count == Some(0) {
            return Err(AppError::Config(
                "MAX_SNAPSHOTS_COUNT must be at least 1".into(),
            ));
        }

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse("PORT", lookup("PORT"), 3000)?,
            storage,
            database_url,
            database_max_connections: parse(
                "DATABASE_MAX_CONNECTIONS",
                lookup("DATABASE_MAX_CONNECTIONS"),
                10,
            )?,
            dispatch_enabled: parse("DISPATCH_ENABLED", lookup("DISPATCH_ENABLED"), false)?,
            dispatch_interval: Duration::from_millis(parse(
                "DISPATCH_INTERVAL_MS",
                lookup("DISPATCH_INTERVAL_MS"),
                100,
            )?),
            connect_timeout: Duration::from_millis(parse(
                "CONNECT_TIMEOUT_MS",
                lookup("CONNECT_TIMEOUT_MS"),
                10_000,
            )?),
            max_snapshots_count,
        })
    }

    /// Socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if host and port do not form an address.
    pub fn addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }

    /// Eventstore options derived from this configuration.
    #[must_use]
    pub fn eventstore_options(&self) -> EventstoreOptions {
        EventstoreOptions {
            dispatch_interval: self.dispatch_interval,
            connect_timeout: self.connect_timeout,
            max_snapshots_count: self.max_snapshots_count,
            ..EventstoreOptions::default()
        }
    }
}
