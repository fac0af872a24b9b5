use bt2c_core::constants::{
    BLOCK_TIME_MS, FINALIZATION_TIMEOUT_MS, JAIL_DURATION_SECS, MAX_BLOCK_BYTES, MAX_BLOCK_TXS,
    MAX_MISSED_BLOCKS, MIN_STAKE_SATS, MIN_VALIDATORS, PROPOSAL_TIMEOUT_MS, SLASHING_PENALTY_BP,
    VOTING_TIMEOUT_MS,
};
use bt2c_core::types::Amount;
use serde::{Deserialize, Serialize};

/// rPoS engine policy: round timing, validator gating, jail and slashing
/// rules, block construction caps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Target spacing between commits (milliseconds).
    pub block_time_ms: u64,
    /// Deadline for the proposer's block to arrive.
    pub proposal_timeout_ms: u64,
    /// Deadline for the prevote quorum.
    pub voting_timeout_ms: u64,
    /// Deadline for the precommit quorum.
    pub finalization_timeout_ms: u64,
    /// Eligible validators required before rounds start.
    pub min_validators: usize,
    /// Stake floor for registration and eligibility (satoshis).
    pub min_stake: Amount,
    /// Consecutive missed proposals before jailing.
    pub max_missed_blocks: u32,
    /// Jail term (seconds); slashable offenses jail for twice this.
    pub jail_duration_s: i64,
    /// Stake fraction removed on a slashable offense (basis points).
    pub slashing_penalty_bp: u64,
    /// Offense names treated as permanent (tombstoning).
    pub tombstoning_offenses: Vec<String>,
    /// Block construction caps.
    pub max_block_txs: usize,
    pub max_block_bytes: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            block_time_ms: BLOCK_TIME_MS,
            proposal_timeout_ms: PROPOSAL_TIMEOUT_MS,
            voting_timeout_ms: VOTING_TIMEOUT_MS,
            finalization_timeout_ms: FINALIZATION_TIMEOUT_MS,
            min_validators: MIN_VALIDATORS,
            min_stake: MIN_STAKE_SATS,
            max_missed_blocks: MAX_MISSED_BLOCKS,
            jail_duration_s: JAIL_DURATION_SECS,
            slashing_penalty_bp: SLASHING_PENALTY_BP,
            tombstoning_offenses: vec!["double_signing".to_string()],
            max_block_txs: MAX_BLOCK_TXS,
            max_block_bytes: MAX_BLOCK_BYTES,
        }
    }
}
