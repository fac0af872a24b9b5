//! Deterministic proposer election.
//!
//! Every node must pick the same proposer from the same registry and the
//! same `(height, round, parent_hash)`. Candidates are taken in address
//! order, weights are pure integer arithmetic, and the draw comes from the
//! seeded BLAKE3 generator — no floats, no local entropy.

use bt2c_core::constants::{ELECTION_EPSILON_MILLI, R_MAX_MILLI};
use bt2c_core::types::{Address, BlockHash, Height, Round};
use bt2c_crypto::draw::{draw_in_range, election_seed};
use tracing::debug;

use crate::registry::Validator;

/// `w = stake · (ε + reputation/R_max)`, in stake·milli units.
/// ε keeps a zero-reputation validator drawable.
pub fn validator_weight(validator: &Validator) -> u128 {
    let reputation_fraction_milli = (validator.reputation_milli * 1_000 / R_MAX_MILLI) as u128;
    validator.stake as u128 * (ELECTION_EPSILON_MILLI as u128 + reputation_fraction_milli)
}

/// Select the proposer for `(height, round)` on top of `parent_hash`.
///
/// `eligible` must already be filtered and in address order (the registry's
/// `eligible()` provides both). Returns `None` when the set is empty.
pub fn select_proposer(
    eligible: &[&Validator],
    height: Height,
    round: Round,
    parent_hash: &BlockHash,
) -> Option<Address> {
    let total: u128 = eligible.iter().map(|v| validator_weight(v)).sum();
    if total == 0 {
        return None;
    }

    let seed = election_seed(height, round, parent_hash.as_bytes());
    let mut target = draw_in_range(&seed, total);
    for validator in eligible {
        let weight = validator_weight(validator);
        if target < weight {
            debug!(
                height,
                round,
                proposer = %validator.address,
                "proposer selected"
            );
            return Some(validator.address);
        }
        target -= weight;
    }
    // The draw is strictly below the weight sum, so the walk always lands.
    unreachable!("weighted draw exceeded total weight")
}
