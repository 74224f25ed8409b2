use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::category::CategoryVocabulary;
use crate::{Error, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub categories: CategoryVocabulary,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_bind() -> String {
    "0.0.0.0:4000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_db_path(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("topics.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Base url of the pipeline service. Without it only the dummy pipeline is used.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Substitute dummy results when the pipeline cannot categorize or summarize.
    #[serde(default = "default_fallback")]
    pub fallback: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout_secs(),
            fallback: default_fallback(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_fallback() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_level() }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        match self.storage.backend.as_str() {
            "sqlite" | "memory" => {}
            other => {
                return Err(Error::Config(format!(
                    "Unknown storage backend: '{}'. Must be sqlite or memory.",
                    other
                )))
            }
        }
        if let Some(url) = &self.pipeline.url {
            url::Url::parse(url)
                .map_err(|e| Error::Config(format!("pipeline.url is not a valid url: {}", e)))?;
        }
        if self.pipeline.timeout_secs == 0 {
            return Err(Error::Config("pipeline.timeout_secs must be > 0".to_string()));
        }
        match self.logging.level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(Error::Config(format!("Unknown logging.level: '{}'", other))),
        }
        self.categories.check()
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    parse_config(&content)
}

/// Loads `path` when it exists, otherwise falls back to the defaults.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }
}
