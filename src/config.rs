use std::env;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading the node configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Node settings, read from the environment (and `.env` if present)
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,

    /// Directory of the sled database
    pub data_dir: PathBuf,

    /// Mining difficulty, fixed for the lifetime of the chain
    pub difficulty: usize,

    /// Optional JSON list of check-in locations
    pub locations_file: Option<PathBuf>,

    /// Optional JSON list of chapters sealed into a fresh chain at startup
    pub chapters_file: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("data/quranchain"),
            difficulty: 4,
            locations_file: None,
            chapters_file: None,
        }
    }
}

impl NodeConfig {
    /// Loads `.env` and reads the `QURANCHAIN_*` variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = NodeConfig::default();

        if let Some(host) = lookup("QURANCHAIN_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("QURANCHAIN_PORT") {
            config.port = parse("QURANCHAIN_PORT", port)?;
        }
        if let Some(dir) = lookup("QURANCHAIN_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(difficulty) = lookup("QURANCHAIN_DIFFICULTY") {
            config.difficulty = parse("QURANCHAIN_DIFFICULTY", difficulty)?;
            if config.difficulty > 64 {
                return Err(ConfigError::InvalidValue {
                    key: "QURANCHAIN_DIFFICULTY",
                    value: config.difficulty.to_string(),
                });
            }
        }
        config.locations_file = lookup("QURANCHAIN_LOCATIONS").map(PathBuf::from);
        config.chapters_file = lookup("QURANCHAIN_CHAPTERS").map(PathBuf::from);

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}
