use thiserror::Error;

use crate::types::{Amount, Height, Nonce, Round};

#[derive(Debug, Error)]
pub enum Bt2cError {
    // ── Validation ───────────────────────────────────────────────────────────
    #[error("invalid signature")]
    InvalidSignature,

    #[error("sender address does not match the attached public key")]
    AddressKeyMismatch,

    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: Nonce, got: Nonce },

    #[error("insufficient balance: need {need} sat, have {have}")]
    InsufficientBalance { need: Amount, have: Amount },

    #[error("invalid previous hash: expected {expected}, got {got}")]
    InvalidPreviousHash { expected: String, got: String },

    #[error("invalid height: expected {expected}, got {got}")]
    InvalidHeight { expected: Height, got: Height },

    #[error("block timestamp precedes parent")]
    InvalidTimestamp,

    #[error("invalid coinbase reward: expected {expected} sat, got {got}")]
    InvalidReward { expected: Amount, got: Amount },

    #[error("transaction already spent: {0}")]
    DoubleSpend(String),

    #[error("transaction has expired")]
    TransactionExpired,

    // ── Capacity ─────────────────────────────────────────────────────────────
    #[error("mempool is full")]
    MempoolFull,

    #[error("fee below minimum: need {min} sat, got {got}")]
    FeeBelowMinimum { min: Amount, got: Amount },

    #[error("replacement fee-rate too low: need {required} msat/byte, got {got}")]
    ReplacementFeeTooLow { required: u64, got: u64 },

    #[error("duplicate transaction: {0}")]
    DuplicateTransaction(String),

    // ── Consensus ────────────────────────────────────────────────────────────
    #[error("not the eligible proposer for this round")]
    NotEligibleProposer,

    #[error("round timed out at height {height}, round {round}")]
    RoundTimeout { height: Height, round: Round },

    #[error("insufficient votes: needed {needed}, got {got}")]
    InsufficientVotes { needed: usize, got: usize },

    #[error("no eligible validators")]
    NoEligibleValidators,

    // ── Validator registry ───────────────────────────────────────────────────
    #[error("validator already registered: {0}")]
    ValidatorExists(String),

    #[error("unknown validator: {0}")]
    UnknownValidator(String),

    #[error("stake below minimum: need {min} sat, got {got}")]
    StakeBelowMinimum { min: Amount, got: Amount },

    #[error("validator registry is closed")]
    RegistryClosed,

    #[error("validator is tombstoned: {0}")]
    ValidatorTombstoned(String),

    // ── Storage ──────────────────────────────────────────────────────────────
    #[error("block append failed: {0}")]
    AppendFailed(String),

    #[error("corrupt block index: {0}")]
    CorruptIndex(String),

    #[error("checkpoint verification failed: {0}")]
    CheckpointVerificationFailed(String),

    #[error("reorg of {needed} blocks exceeds limit {limit}")]
    ReorgLimitExceeded { limit: u64, needed: u64 },

    #[error("reorg would cross the checkpoint at height {checkpoint_height}")]
    ReorgAcrossCheckpoint { checkpoint_height: Height },

    #[error("unknown block: {0}")]
    UnknownBlock(String),

    // ── Fatal ────────────────────────────────────────────────────────────────
    #[error("reward of {reward} sat would exceed max supply (minted {minted})")]
    SupplyExceeded { reward: Amount, minted: Amount },

    #[error("genesis supply mismatch: expected {expected}, got {got}")]
    GenesisSupplyMismatch { expected: Amount, got: Amount },

    #[error("consensus engine halted: {0}")]
    EngineHalted(String),

    // ── Serialization / storage plumbing ─────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl Bt2cError {
    /// Validation and capacity errors are local to the caller and never
    /// cascade; everything else may require round- or engine-level handling.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Bt2cError::InvalidSignature
                | Bt2cError::AddressKeyMismatch
                | Bt2cError::InvalidNonce { .. }
                | Bt2cError::InsufficientBalance { .. }
                | Bt2cError::InvalidPreviousHash { .. }
                | Bt2cError::InvalidHeight { .. }
                | Bt2cError::InvalidTimestamp
                | Bt2cError::InvalidReward { .. }
                | Bt2cError::DoubleSpend(_)
                | Bt2cError::TransactionExpired
                | Bt2cError::MempoolFull
                | Bt2cError::FeeBelowMinimum { .. }
                | Bt2cError::ReplacementFeeTooLow { .. }
                | Bt2cError::DuplicateTransaction(_)
        )
    }
}
