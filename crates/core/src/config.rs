//! Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use cairn_network::DialConfig;
use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;

/// Settings read from an optional config file and `CAIRN_*` variables.
///
/// Relative `db_path` and `identity_path` values live under `data_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub identity_path: PathBuf,
    pub sync_writes: bool,
    pub connect_timeout_secs: u64,
    pub log_level: String,
    pub log_format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/cairn"),
            db_path: PathBuf::from("peers.db"),
            identity_path: PathBuf::from("identity.key"),
            sync_writes: true,
            connect_timeout_secs: 30,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration. A path given explicitly must exist; environment
    /// variables override file values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                bail!("Configuration file {} not found", path.display());
            }
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(Environment::with_prefix("CAIRN").try_parsing(true));

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.connect_timeout_secs == 0 {
            bail!("connect_timeout_secs must be greater than zero");
        }
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            bail!("log_format must be `pretty` or `json`, got `{}`", self.log_format);
        }
        Ok(())
    }

    pub fn db_file(&self) -> PathBuf {
        self.data_dir.join(&self.db_path)
    }

    pub fn identity_file(&self) -> PathBuf {
        self.data_dir.join(&self.identity_path)
    }

    pub fn dial_config(&self) -> DialConfig {
        DialConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}
