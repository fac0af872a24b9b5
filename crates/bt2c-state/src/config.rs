use bt2c_core::constants::{
    DEVELOPER_REWARD_SATS, DISTRIBUTION_PERIOD_SECS, EARLY_VALIDATOR_REWARD_SATS, FLOOR_REWARD_SATS,
    HALVING_INTERVAL, INITIAL_BLOCK_REWARD_SATS, MAX_SUPPLY_SATS, MIN_TX_FEE_SATS,
};
use bt2c_core::types::{Amount, Timestamp};
use serde::{Deserialize, Serialize};

/// Monetary and bootstrap policy. Defaults are BT2C mainnet parameters;
/// tests shrink the intervals.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Coinbase reward before the first halving (satoshis).
    pub initial_block_reward: Amount,
    /// Heights between halvings.
    pub halving_interval: u64,
    /// Hard supply cap (satoshis).
    pub max_supply: Amount,
    /// The reward never halves below this.
    pub floor_reward: Amount,
    /// Network minimum fee (satoshis).
    pub min_tx_fee: Amount,
    /// One-time credit to the first registered validator.
    pub developer_reward: Amount,
    /// One-time credit to later validators inside the window.
    pub early_validator_reward: Amount,
    /// Length of the distribution window after genesis (seconds).
    pub distribution_period_s: i64,
    /// Genesis timestamp (seconds); the distribution window opens here.
    /// The default is a placeholder: the node overwrites it from the
    /// genesis block before any state is built.
    pub genesis_timestamp: Timestamp,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            initial_block_reward: INITIAL_BLOCK_REWARD_SATS,
            halving_interval: HALVING_INTERVAL,
            max_supply: MAX_SUPPLY_SATS,
            floor_reward: FLOOR_REWARD_SATS,
            min_tx_fee: MIN_TX_FEE_SATS,
            developer_reward: DEVELOPER_REWARD_SATS,
            early_validator_reward: EARLY_VALIDATOR_REWARD_SATS,
            distribution_period_s: DISTRIBUTION_PERIOD_SECS,
            genesis_timestamp: 0,
        }
    }
}
