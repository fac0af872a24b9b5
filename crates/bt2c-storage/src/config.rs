use bt2c_core::constants::{
    BLOCKS_PER_FILE, CHECKPOINT_INTERVAL, MAX_CHECKPOINTS, REORG_LIMIT, SYNC_INTERVAL_MS,
};
use serde::{Deserialize, Serialize};

/// Blockchain store policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Blocks per archive chunk when pruning.
    pub blocks_per_file: u64,
    /// Background fsync cadence (milliseconds).
    pub sync_interval_ms: u64,
    /// Maximum blocks a reorganization may replace.
    pub reorg_limit: u64,
    /// Auto-checkpoint every this many blocks.
    pub checkpoint_interval: u64,
    /// Checkpoints retained before the oldest is pruned.
    pub max_checkpoints: usize,
    /// Keep blocks within this distance of the tip in the main log; older
    /// blocks move to the archive. `None` disables pruning.
    pub prune_threshold: Option<u64>,
    /// Hex block hashes of checkpoints trusted without a signature.
    pub trusted_checkpoints: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            blocks_per_file: BLOCKS_PER_FILE,
            sync_interval_ms: SYNC_INTERVAL_MS,
            reorg_limit: REORG_LIMIT,
            checkpoint_interval: CHECKPOINT_INTERVAL,
            max_checkpoints: MAX_CHECKPOINTS,
            prune_threshold: None,
            trusted_checkpoints: Vec::new(),
        }
    }
}
