use bt2c_core::constants::{
    CONGESTION_MIN_FEE_RATE, DUST_FEE_RATE, EVICTION_INTERVAL_SECS, HIGH_FEE_THRESHOLD_SATS,
    MEMPOOL_CONGESTION_PERCENT, MEMPOOL_MAX_BYTES, MEMPOOL_TARGET_SIZE_PERCENT,
    MIN_AGE_FOR_EVICTION_SECS, MIN_TX_FEE_SATS, PRIORITY_ALPHA, PRIORITY_BETA, PRIORITY_GAMMA,
    RBF_MULTIPLIER_BP, SUSPICIOUS_PRIORITY_MULTIPLIER, SUSPICIOUS_TX_MAX_AGE_SECS, TX_MAX_AGE_SECS,
};
use bt2c_core::types::Amount;
use serde::{Deserialize, Serialize};

/// Mempool admission, ordering and eviction policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MempoolConfig {
    /// Hard capacity in encoded bytes.
    pub max_bytes: usize,
    /// Eviction drains down to this fraction of `max_bytes` (percent).
    pub target_size_percent: u64,
    /// Occupancy above this fraction is congestion (percent).
    pub congestion_percent: u64,
    /// Default transaction time-to-live (seconds).
    pub tx_max_age_s: i64,
    /// Flagged transactions expire faster (seconds).
    pub suspicious_tx_max_age_s: i64,
    /// Cadence of the background eviction sweep (seconds).
    pub eviction_interval_s: u64,
    /// Entries younger than this survive eviction sweeps (seconds).
    pub min_age_for_eviction_s: i64,
    /// Replace-by-fee multiplier in basis points (12_500 = 1.25×).
    pub rbf_multiplier_bp: u64,
    /// Fee-rate floor while congested (sat/byte).
    pub congestion_min_fee_rate: u64,
    /// Below this fee rate a transaction is dust (sat/byte).
    pub dust_fee_rate: u64,
    /// Absolute fee above this is anomalous (satoshis).
    pub high_fee_threshold: Amount,
    /// Network minimum fee (satoshis).
    pub min_fee: Amount,
    /// Priority weights: `α·fee_rate − β·age + γ·ancestors`.
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    /// Priority multiplier for suspicious entries (evicted sooner).
    pub suspicious_multiplier: f64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_bytes: MEMPOOL_MAX_BYTES,
            target_size_percent: MEMPOOL_TARGET_SIZE_PERCENT,
            congestion_percent: MEMPOOL_CONGESTION_PERCENT,
            tx_max_age_s: TX_MAX_AGE_SECS,
            suspicious_tx_max_age_s: SUSPICIOUS_TX_MAX_AGE_SECS,
            eviction_interval_s: EVICTION_INTERVAL_SECS,
            min_age_for_eviction_s: MIN_AGE_FOR_EVICTION_SECS,
            rbf_multiplier_bp: RBF_MULTIPLIER_BP,
            congestion_min_fee_rate: CONGESTION_MIN_FEE_RATE,
            dust_fee_rate: DUST_FEE_RATE,
            high_fee_threshold: HIGH_FEE_THRESHOLD_SATS,
            min_fee: MIN_TX_FEE_SATS,
            alpha: PRIORITY_ALPHA,
            beta: PRIORITY_BETA,
            gamma: PRIORITY_GAMMA,
            suspicious_multiplier: SUSPICIOUS_PRIORITY_MULTIPLIER,
        }
    }
}

impl MempoolConfig {
    pub fn target_bytes(&self) -> usize {
        (self.max_bytes as u64 * self.target_size_percent / 100) as usize
    }

    pub fn congestion_bytes(&self) -> usize {
        (self.max_bytes as u64 * self.congestion_percent / 100) as usize
    }
}
