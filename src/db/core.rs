use std::path::Path;
use std::sync::Once;

use serde::Deserialize;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tracing::info;

use crate::error::{ConfigError, OpenError};
use crate::model::ColumnLimits;
use crate::TARGET_DB;

/// Which engine a store handle talks to. Only schema bootstrap cares; every
/// query after that is written to run on both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
}

/// Connection parameters for a networked store, loaded from a YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct PgConfig {
    #[serde(default = "PgConfig::default_host")]
    pub host: String,
    #[serde(default = "PgConfig::default_port")]
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl PgConfig {
    fn default_host() -> String {
        "127.0.0.1".to_string()
    }

    fn default_port() -> u16 {
        5432
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let config: PgConfig = serde_yaml::from_str(&raw)?;

        let missing: Vec<&str> = [
            ("user", config.user.is_none()),
            ("password", config.password.is_none()),
            ("database", config.database.is_none()),
        ]
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(key, _)| *key)
        .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingKeys(missing.join(", ")));
        }

        Ok(config)
    }

    fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user.as_deref().unwrap_or_default(),
            self.password.as_deref().unwrap_or_default(),
            self.host,
            self.port,
            self.database.as_deref().unwrap_or_default(),
        )
    }
}

/// The persistence boundary: one table of news items with a unique index on
/// the (truncated) text column. One live handle per process owns the write
/// path; the unique index is the final arbiter if two writers ever race.
#[derive(Clone)]
pub struct Store {
    pool: AnyPool,
    backend: Backend,
    limits: ColumnLimits,
}

fn install_drivers() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(sqlx::any::install_default_drivers);
}

impl Store {
    /// Open (creating if missing) an embedded SQLite store at `path`.
    pub async fn open_sqlite(
        path: impl AsRef<Path>,
        limits: ColumnLimits,
    ) -> Result<Self, OpenError> {
        let url = format!("sqlite://{}?mode=rwc", path.as_ref().display());
        info!(target: TARGET_DB, "Opening sqlite store at {}", path.as_ref().display());
        Self::connect(&url, Backend::Sqlite, limits, 5).await
    }

    /// Connect to a networked Postgres store.
    pub async fn open_postgres(config: &PgConfig, limits: ColumnLimits) -> Result<Self, OpenError> {
        info!(
            target: TARGET_DB,
            "Connecting to postgres store at {}:{}", config.host, config.port
        );
        Self::connect(&config.connection_url(), Backend::Postgres, limits, 5).await
    }

    /// In-memory SQLite store. A single connection, since every in-memory
    /// connection is its own database.
    pub async fn open_in_memory(limits: ColumnLimits) -> Result<Self, OpenError> {
        Self::connect("sqlite::memory:", Backend::Sqlite, limits, 1).await
    }

    async fn connect(
        url: &str,
        backend: Backend,
        limits: ColumnLimits,
        max_connections: u32,
    ) -> Result<Self, OpenError> {
        install_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        let store = Store {
            pool,
            backend,
            limits,
        };
        store.initialize_schema().await?;
        info!(target: TARGET_DB, "Store ready ({:?})", backend);
        Ok(store)
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn limits(&self) -> &ColumnLimits {
        &self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_sqlite_creates_missing_file_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news.db");

        let store = Store::open_sqlite(&path, ColumnLimits::default())
            .await
            .unwrap();
        assert_eq!(store.backend(), Backend::Sqlite);
        assert!(path.exists());
        drop(store);

        // Second open must tolerate the existing schema.
        Store::open_sqlite(&path, ColumnLimits::default())
            .await
            .unwrap();
    }

    #[test]
    fn pg_config_reports_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pg.yaml");
        std::fs::write(&path, "user: newsreel\ndatabase: news\n").unwrap();

        let err = PgConfig::load(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKeys(ref keys) if keys == "password"));
    }

    #[test]
    fn pg_config_fills_host_and_port_defaults() {
        let config: PgConfig =
            serde_yaml::from_str("user: u\npassword: p\ndatabase: news\n").unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 5432);
        assert_eq!(config.connection_url(), "postgres://u:p@127.0.0.1:5432/news");
    }

    #[test]
    fn pg_config_missing_file_is_an_io_error() {
        let err = PgConfig::load("/nonexistent/pg.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
