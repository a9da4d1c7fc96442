//! Runtime configuration.
//!
//! Supports configuration via environment variables:
//!
//! ```bash
//! PERMSCOPE_DB=./data/permscope.mdb      # LMDB directory
//! PERMSCOPE_MAP_SIZE=1073741824          # LMDB map size in bytes
//! PERMSCOPE_ADDR=0.0.0.0:3000            # REST listen address
//! PERMSCOPE_RETRY_BUDGET=3               # write attempts before surfacing a conflict
//! ```

use std::env;

use serde::Deserialize;
use thiserror::Error;

use crate::constants::DEFAULT_RETRY_BUDGET;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: String,
    pub map_size: usize,
    pub listen_addr: String,
    /// Attempts for a conflicting write, each after a fresh resolution.
    pub retry_budget: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: "./data/permscope.mdb".into(),
            map_size: 1 << 30,
            listen_addr: "0.0.0.0:3000".into(),
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("retry budget must be at least 1")]
    ZeroRetryBudget,

    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut c = Config::default();
        if let Some(v) = parse_var("PERMSCOPE_DB")? {
            c.db_path = v;
        }
        if let Some(v) = parse_var("PERMSCOPE_MAP_SIZE")? {
            c.map_size = v;
        }
        if let Some(v) = parse_var("PERMSCOPE_ADDR")? {
            c.listen_addr = v;
        }
        if let Some(v) = parse_var("PERMSCOPE_RETRY_BUDGET")? {
            c.retry_budget = v;
        }
        c.validate()
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str::<Config>(s)?.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.retry_budget == 0 {
            return Err(ConfigError::ZeroRetryBudget);
        }
        Ok(self)
    }
}
