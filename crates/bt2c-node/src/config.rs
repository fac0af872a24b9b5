use std::path::Path;

use bt2c_consensus::ConsensusConfig;
use bt2c_core::error::Bt2cError;
use bt2c_mempool::MempoolConfig;
use bt2c_state::ChainConfig;
use bt2c_storage::StoreConfig;
use serde::{Deserialize, Serialize};

/// Full node configuration: the per-subsystem policies plus node-level
/// switches. Loaded from a JSON file merged over defaults; every field is
/// optional in the file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub chain: ChainConfig,
    pub consensus: ConsensusConfig,
    pub mempool: MempoolConfig,
    pub store: StoreConfig,
    /// Participate as a validator (sign proposals and votes) rather than a
    /// passive peer.
    pub validator: bool,
    /// Maintain the address-indexed side-store (`utxo.dat`).
    pub address_index: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            chain: ChainConfig::default(),
            consensus: ConsensusConfig::default(),
            mempool: MempoolConfig::default(),
            store: StoreConfig::default(),
            validator: true,
            address_index: true,
        }
    }
}

impl NodeConfig {
    /// Load a JSON config file; absent keys keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Bt2cError> {
        let bytes = std::fs::read(path).map_err(|e| Bt2cError::Storage(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| Bt2cError::Serialization(e.to_string()))
    }
}
