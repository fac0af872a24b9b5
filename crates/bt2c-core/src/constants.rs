//! ─── BT2C Protocol Constants ────────────────────────────────────────────────
//!
//! Fixed supply: 21,000,000 BT2C, Bitcoin's emission curve, rPoS consensus.
//! Base unit:    satoshi  (1 BT2C = 100,000,000 sat)
//! Ticker:       BT2C

// ── Supply & monetary policy ─────────────────────────────────────────────────

/// 1 BT2C expressed in satoshis.
pub const SATS_PER_BT2C: u64 = 100_000_000;

/// Hard supply cap in satoshis. Never exceeded; the final coinbase is
/// truncated to the remaining headroom.
pub const MAX_SUPPLY_SATS: u64 = 21_000_000 * SATS_PER_BT2C;

/// Coinbase reward at height 0..HALVING_INTERVAL (21 BT2C).
pub const INITIAL_BLOCK_REWARD_SATS: u64 = 21 * SATS_PER_BT2C;

/// Heights between reward halvings.
pub const HALVING_INTERVAL: u64 = 210_000;

/// The reward never halves below one satoshi.
pub const FLOOR_REWARD_SATS: u64 = 1;

/// Network minimum transaction fee.
pub const MIN_TX_FEE_SATS: u64 = 1_000;

// ── Distribution period (validator bootstrap) ────────────────────────────────

/// Window after genesis during which one-off validator credits are issued.
pub const DISTRIBUTION_PERIOD_SECS: i64 = 14 * 24 * 3600;

/// One-time credit to the first registered validator (developer node).
pub const DEVELOPER_REWARD_SATS: u64 = 100 * SATS_PER_BT2C;

/// One-time credit to every later validator registering inside the window.
pub const EARLY_VALIDATOR_REWARD_SATS: u64 = SATS_PER_BT2C;

// ── Validators & reputation ──────────────────────────────────────────────────

/// Minimum stake to register (1 BT2C).
pub const MIN_STAKE_SATS: u64 = SATS_PER_BT2C;

/// Validators required before consensus starts.
pub const MIN_VALIDATORS: usize = 1;

/// Reputation ceiling, in milli-points (100.000).
pub const R_MAX_MILLI: u64 = 100_000;

/// Reputation every validator starts with (half of the ceiling).
pub const INITIAL_REPUTATION_MILLI: u64 = R_MAX_MILLI / 2;

/// Per-commit multiplicative decay, in per-mille (10 ⇒ r ← r·0.99).
pub const REPUTATION_DECAY_PER_MILLE: u64 = 10;

/// Additive bump for a successful proposal, in milli-points, before the
/// accuracy/uptime weighting.
pub const REPUTATION_SUCCESS_DELTA_MILLI: u64 = 2_000;

/// Subtractive hit for a missed or failed proposal, in milli-points.
pub const REPUTATION_FAILURE_DELTA_MILLI: u64 = 5_000;

/// Jailing halves reputation.
pub const JAIL_REPUTATION_NUM: u64 = 1;
pub const JAIL_REPUTATION_DEN: u64 = 2;

/// ε in the election weight `stake · (ε + reputation/R_max)`, in milli-units.
/// Keeps a zero-reputation validator drawable.
pub const ELECTION_EPSILON_MILLI: u64 = 50;

/// Missed proposals before a validator is jailed.
pub const MAX_MISSED_BLOCKS: u32 = 50;

/// Default jail term (seconds).
pub const JAIL_DURATION_SECS: i64 = 3_600;

/// Stake fraction removed on a slashable offense, in basis points (10 %).
pub const SLASHING_PENALTY_BP: u64 = 1_000;

// ── Consensus timing ─────────────────────────────────────────────────────────

/// Target spacing between commits.
pub const BLOCK_TIME_MS: u64 = 60_000;

pub const PROPOSAL_TIMEOUT_MS: u64 = 10_000;
pub const VOTING_TIMEOUT_MS: u64 = 10_000;
pub const FINALIZATION_TIMEOUT_MS: u64 = 10_000;

/// Block construction caps.
pub const MAX_BLOCK_TXS: usize = 1_000;
pub const MAX_BLOCK_BYTES: usize = 1024 * 1024;

// ── Mempool policy ───────────────────────────────────────────────────────────

pub const MEMPOOL_MAX_BYTES: usize = 32 * 1024 * 1024;

/// Capacity fraction admission aims for after an eviction pass (percent).
pub const MEMPOOL_TARGET_SIZE_PERCENT: u64 = 90;

/// Occupancy above which the pool is considered congested (percent).
pub const MEMPOOL_CONGESTION_PERCENT: u64 = 80;

/// Default per-transaction time-to-live.
pub const TX_MAX_AGE_SECS: i64 = 24 * 3600;

/// Flagged transactions expire faster.
pub const SUSPICIOUS_TX_MAX_AGE_SECS: i64 = 3_600;

pub const EVICTION_INTERVAL_SECS: u64 = 60;

/// Entries younger than this survive eviction sweeps.
pub const MIN_AGE_FOR_EVICTION_SECS: i64 = 30;

/// Replacement fee-rate multiplier, in basis points (1.25×).
pub const RBF_MULTIPLIER_BP: u64 = 12_500;

/// Fee-rate floor applied while congested (sat/byte).
pub const CONGESTION_MIN_FEE_RATE: u64 = 2;

/// Below one sat/byte a fee is dust — flagged suspicious.
pub const DUST_FEE_RATE: u64 = 1;

/// Absolute fee above this is anomalous — flagged suspicious (10 BT2C).
pub const HIGH_FEE_THRESHOLD_SATS: u64 = 10 * SATS_PER_BT2C;

/// Priority weights: `α·fee_rate − β·age + γ·ancestor_bonus`.
pub const PRIORITY_ALPHA: f64 = 1.0;
pub const PRIORITY_BETA: f64 = 0.001;
pub const PRIORITY_GAMMA: f64 = 0.1;

/// Suspicious entries keep half their priority, so they evict first.
pub const SUSPICIOUS_PRIORITY_MULTIPLIER: f64 = 0.5;

// ── Blockchain store ─────────────────────────────────────────────────────────

/// On-disk format tag in the block-log header. Newer minor versions must
/// read older data.
pub const BLOCK_LOG_VERSION: u16 = 1;

/// Blocks per archive chunk when pruning.
pub const BLOCKS_PER_FILE: u64 = 10_000;

/// Background fsync cadence.
pub const SYNC_INTERVAL_MS: u64 = 5_000;

/// Maximum blocks a single reorganization may replace.
pub const REORG_LIMIT: u64 = 100;

/// Auto-checkpoint every this many blocks.
pub const CHECKPOINT_INTERVAL: u64 = 10_000;

/// Checkpoints retained before pruning the oldest.
pub const MAX_CHECKPOINTS: usize = 10;
