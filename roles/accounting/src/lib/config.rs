//! Configuration of the round accounting service
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! pool = "raptoreum"
//! auxiliary_enabled = false
//! consistency = "last-write-wins"
//!
//! [[ports]]
//! port = 3008
//! kind = "solo"
//! ```

use std::path::Path;

use ext_config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::{error::AccountingResult, types::MiningMode};

/// Configuration of one pool's accounting
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountingConfig {
    /// Pool name, used as the prefix of every store key
    pub pool: String,

    /// Account shares on the auxiliary (merge-mined) coin as well
    #[serde(default)]
    pub auxiliary_enabled: bool,

    /// Stratum ports and the mining mode of the workers connected to them
    #[serde(default)]
    pub ports: Vec<PortConfig>,

    /// How concurrent events on one processor are ordered
    #[serde(default)]
    pub consistency: ConsistencyMode,

    /// Share gaps at or above this many seconds break continuous mining time
    /// Default: 900
    #[serde(default = "default_continuous_gap_secs")]
    pub continuous_gap_secs: f64,

    /// Window of hashrate samples considered by the read side
    /// Default: 300
    #[serde(default = "default_hashrate_window_secs")]
    pub hashrate_window_secs: u64,

    /// Hashes represented by one unit of share difficulty
    /// Default: 2^32
    #[serde(default = "default_hashrate_multiplier")]
    pub hashrate_multiplier: f64,

    /// Optional log level filter
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PortConfig {
    pub port: u16,
    pub kind: MiningMode,
}

/// Ordering of read-decide-write sequences on one processor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsistencyMode {
    /// Events run concurrently; the last batch written wins
    #[default]
    LastWriteWins,
    /// Events are accounted one at a time
    Serialized,
}

impl AccountingConfig {
    /// Configuration with defaults for everything but the pool name.
    pub fn new(pool: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            auxiliary_enabled: false,
            ports: Vec::new(),
            consistency: ConsistencyMode::default(),
            continuous_gap_secs: default_continuous_gap_secs(),
            hashrate_window_secs: default_hashrate_window_secs(),
            hashrate_multiplier: default_hashrate_multiplier(),
            log_level: None,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> AccountingResult<Self> {
        let path = path.as_ref().to_string_lossy().into_owned();
        let config = Config::builder()
            .add_source(File::new(&path, FileFormat::Toml))
            .build()?
            .try_deserialize::<AccountingConfig>()?;
        Ok(config)
    }

    /// Mining mode of a worker connected to `port`.
    ///
    /// Unknown ports, and events without a port, are shared.
    pub fn mode_for(&self, port: Option<u16>) -> MiningMode {
        port.and_then(|port| self.ports.iter().find(|entry| entry.port == port))
            .map(|entry| entry.kind)
            .unwrap_or(MiningMode::Shared)
    }
}

fn default_continuous_gap_secs() -> f64 {
    900.0
}

fn default_hashrate_window_secs() -> u64 {
    300
}

fn default_hashrate_multiplier() -> f64 {
    4_294_967_296.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_defaults() {
        let config: AccountingConfig = toml::from_str(r#"pool = "raptoreum""#).unwrap();
        assert_eq!(config.pool, "raptoreum");
        assert!(!config.auxiliary_enabled);
        assert!(config.ports.is_empty());
        assert_eq!(config.consistency, ConsistencyMode::LastWriteWins);
        assert_eq!(config.continuous_gap_secs, 900.0);
        assert_eq!(config.hashrate_window_secs, 300);
        assert_eq!(config.hashrate_multiplier, 4_294_967_296.0);
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_config_custom_values() {
        let config_toml = r#"
            pool = "raptoreum"
            auxiliary_enabled = true
            consistency = "serialized"
            continuous_gap_secs = 600
            log_level = "debug"

            [[ports]]
            port = 3008
            kind = "solo"

            [[ports]]
            port = 3002
            kind = "shared"
        "#;

        let config: AccountingConfig = toml::from_str(config_toml).unwrap();
        assert!(config.auxiliary_enabled);
        assert_eq!(config.consistency, ConsistencyMode::Serialized);
        assert_eq!(config.continuous_gap_secs, 600.0);
        assert_eq!(config.mode_for(Some(3008)), MiningMode::Solo);
        assert_eq!(config.mode_for(Some(3002)), MiningMode::Shared);
        assert_eq!(config.mode_for(Some(4000)), MiningMode::Shared);
        assert_eq!(config.mode_for(None), MiningMode::Shared);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "pool = \"file-pool\"\nhashrate_window_secs = 60").unwrap();

        let config = AccountingConfig::from_file(file.path()).unwrap();
        assert_eq!(config.pool, "file-pool");
        assert_eq!(config.hashrate_window_secs, 60);
    }

    #[test]
    fn test_config_missing_pool_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "auxiliary_enabled = true").unwrap();

        assert!(AccountingConfig::from_file(file.path()).is_err());
    }
}
