//! Settings file for the `pgdata` binary

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use pgdata::{CliOgrRunner, ConnectionMode, DatabaseOptions, PoolConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: Option<String>,
    pub schema: Option<String>,
    pub sql_path: Option<PathBuf>,
    pub no_pool: bool,
    pub strict: bool,
    pub pool: PoolSettings,
    pub ogr: OgrSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub max_size: usize,
    pub acquire_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 5,
            acquire_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OgrSettings {
    /// Path or name of the `ogr2ogr` binary
    pub binary: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `pgdata=debug`
    pub level: Option<String>,
    /// Write daily-rolling JSON logs here
    pub json_log_dir: Option<PathBuf>,
}

impl Settings {
    /// `<config_dir>/pgdata/settings.toml`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not find config directory")?;
        Ok(config_dir.join("pgdata").join("settings.toml"))
    }

    /// Read `path`, or the default file when `None`.
    ///
    /// A missing default file yields default settings; a missing explicit
    /// file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Ok(path) => (path, false),
                Err(_) => return Ok(Self::default()),
            },
        };
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse settings in {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn connection_mode(&self) -> Result<ConnectionMode> {
        if self.no_pool {
            return Ok(ConnectionMode::NoPool);
        }
        let config = PoolConfig::new(self.pool.max_size)?
            .with_acquire_timeout_ms(self.pool.acquire_timeout_ms);
        Ok(ConnectionMode::Pooled(config))
    }

    /// Handle options described by these settings
    pub fn database_options(&self) -> Result<DatabaseOptions> {
        let mut options = DatabaseOptions::new()
            .with_mode(self.connection_mode()?)
            .strict(self.strict);
        if let Some(schema) = &self.schema {
            options = options.with_schema(schema.clone());
        }
        if let Some(path) = &self.sql_path {
            options = options.with_sql_path(path.clone());
        }
        if let Some(binary) = &self.ogr.binary {
            options = options.with_ogr_binary(binary.clone());
        }
        if let Some(secs) = self.ogr.timeout_secs {
            let runner = CliOgrRunner::new().with_timeout(Duration::from_secs(secs));
            options = options.with_ogr_runner(Arc::new(runner));
        }
        Ok(options)
    }
}
