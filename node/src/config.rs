//! Node configuration with TOML file support.

use crate::NodeError;
use meridian_types::{ChainParams, Timestamp};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a Meridian node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Data directory for block storage.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Hex-encoded public key of the genesis producer. Unset boots a
    /// throwaway dev network.
    pub genesis_public_key: Option<String>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Overrides over the production chain parameters, for test networks.
    pub chain: ChainOverrides,
}

/// Optional per-field chain-parameter overrides.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainOverrides {
    pub genesis_time_secs: Option<u64>,
    pub block_interval_secs: Option<u64>,
    pub max_block_size: Option<u32>,
    pub irreversibility_depth: Option<u32>,
    pub undo_capacity: Option<usize>,
    pub maintenance_interval_secs: Option<u64>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            genesis_public_key: None,
            log_format: default_log_format(),
            log_level: default_log_level(),
            chain: ChainOverrides::default(),
        }
    }
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./meridian_data")
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, NodeError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Production parameters with this config's overrides applied.
    pub fn chain_params(&self) -> ChainParams {
        let mut params = ChainParams::meridian_defaults();
        if let Some(secs) = self.chain.genesis_time_secs {
            params.genesis_time = Timestamp::new(secs);
        }
        if let Some(interval) = self.chain.block_interval_secs {
            params.block_interval_secs = interval;
        }
        if let Some(size) = self.chain.max_block_size {
            params.max_block_size = size;
        }
        if let Some(depth) = self.chain.irreversibility_depth {
            params.irreversibility_depth = depth;
        }
        if let Some(capacity) = self.chain.undo_capacity {
            params.undo_capacity = capacity;
        }
        if let Some(interval) = self.chain.maintenance_interval_secs {
            params.maintenance_interval_secs = interval;
        }
        params
    }
}
