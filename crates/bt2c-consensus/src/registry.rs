use std::collections::BTreeMap;

use bt2c_core::constants::{
    INITIAL_REPUTATION_MILLI, JAIL_REPUTATION_DEN, JAIL_REPUTATION_NUM, REPUTATION_DECAY_PER_MILLE,
    REPUTATION_FAILURE_DELTA_MILLI, REPUTATION_SUCCESS_DELTA_MILLI, R_MAX_MILLI,
};
use bt2c_core::error::Bt2cError;
use bt2c_core::types::{Address, Amount, PublicKey, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ── Validator ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidatorState {
    Active,
    Inactive,
    Jailed,
    Tombstoned,
}

/// One registered validator: stake, lifecycle state, reputation and
/// performance counters.
///
/// Reputation is an integer in milli-points, `0 ..= R_MAX_MILLI`; every
/// update is integer arithmetic so all nodes agree bit-for-bit. Updates
/// happen only at commit-time transitions — block height is the clock,
/// never the wall clock.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub public_key: PublicKey,
    pub moniker: String,
    pub stake: Amount,
    pub state: ValidatorState,
    pub reputation_milli: u64,
    /// Declared validation accuracy, basis points. Weights the success bump.
    pub accuracy_bp: u32,
    /// Declared uptime, basis points. Weights the success bump.
    pub uptime_bp: u32,
    pub blocks_produced: u64,
    pub blocks_missed: u64,
    /// Misses since the last successful proposal; the jail trigger.
    pub consecutive_missed: u32,
    pub jailed_until: Option<Timestamp>,
    pub tombstoned: bool,
    pub joined_during_distribution: bool,
    pub distribution_reward_claimed: bool,
    pub is_first_validator: bool,
}

impl Validator {
    fn new(address: Address, public_key: PublicKey, stake: Amount, moniker: String) -> Self {
        Self {
            address,
            public_key,
            moniker,
            stake,
            state: ValidatorState::Inactive,
            reputation_milli: INITIAL_REPUTATION_MILLI,
            accuracy_bp: 10_000,
            uptime_bp: 10_000,
            blocks_produced: 0,
            blocks_missed: 0,
            consecutive_missed: 0,
            jailed_until: None,
            tombstoned: false,
            joined_during_distribution: false,
            distribution_reward_claimed: false,
            is_first_validator: false,
        }
    }

    pub fn is_eligible(&self, min_stake: Amount) -> bool {
        self.state == ValidatorState::Active && self.stake >= min_stake
    }

    /// `r ← r·(1−d)`, the shared decay factor of every reputation update.
    fn decayed(&self) -> u64 {
        self.reputation_milli * (1_000 - REPUTATION_DECAY_PER_MILLE) / 1_000
    }
}

// ── ValidatorRegistry ────────────────────────────────────────────────────────

/// The validator set. Addresses are unique; iteration order is address
/// order, which the deterministic proposer election depends on.
pub struct ValidatorRegistry {
    min_stake: Amount,
    closed: bool,
    validators: BTreeMap<Address, Validator>,
}

impl ValidatorRegistry {
    pub fn new(min_stake: Amount) -> Self {
        Self {
            min_stake,
            closed: false,
            validators: BTreeMap::new(),
        }
    }

    pub fn min_stake(&self) -> Amount {
        self.min_stake
    }

    /// Stop accepting registrations (e.g. at the end of a bootstrap phase).
    pub fn close(&mut self) {
        self.closed = true;
    }

    // ── Registration & lifecycle ─────────────────────────────────────────────

    pub fn register(
        &mut self,
        address: Address,
        public_key: PublicKey,
        stake: Amount,
        moniker: impl Into<String>,
    ) -> Result<&mut Validator, Bt2cError> {
        if self.closed {
            return Err(Bt2cError::RegistryClosed);
        }
        if self.validators.contains_key(&address) {
            return Err(Bt2cError::ValidatorExists(address.to_string()));
        }
        if stake < self.min_stake {
            return Err(Bt2cError::StakeBelowMinimum {
                min: self.min_stake,
                got: stake,
            });
        }
        let validator = Validator::new(address, public_key, stake, moniker.into());
        info!(validator = %address, stake, "validator registered");
        Ok(self.validators.entry(address).or_insert(validator))
    }

    pub fn activate(&mut self, address: &Address) -> Result<(), Bt2cError> {
        let v = self.get_mut(address)?;
        if v.tombstoned {
            return Err(Bt2cError::ValidatorTombstoned(address.to_string()));
        }
        if v.state == ValidatorState::Jailed {
            return Err(Bt2cError::UnknownValidator(format!(
                "{address} is jailed; unjail first"
            )));
        }
        v.state = ValidatorState::Active;
        Ok(())
    }

    pub fn deactivate(&mut self, address: &Address) -> Result<(), Bt2cError> {
        let v = self.get_mut(address)?;
        if v.tombstoned {
            return Err(Bt2cError::ValidatorTombstoned(address.to_string()));
        }
        v.state = ValidatorState::Inactive;
        Ok(())
    }

    /// Jail until `until`; reputation takes the jail penalty factor.
    pub fn jail(&mut self, address: &Address, until: Timestamp) -> Result<(), Bt2cError> {
        let v = self.get_mut(address)?;
        if v.tombstoned {
            return Err(Bt2cError::ValidatorTombstoned(address.to_string()));
        }
        v.state = ValidatorState::Jailed;
        v.jailed_until = Some(until);
        v.reputation_milli = v.reputation_milli * JAIL_REPUTATION_NUM / JAIL_REPUTATION_DEN;
        warn!(validator = %address, until, "validator jailed");
        Ok(())
    }

    pub fn unjail(&mut self, address: &Address) -> Result<(), Bt2cError> {
        let v = self.get_mut(address)?;
        if v.tombstoned {
            return Err(Bt2cError::ValidatorTombstoned(address.to_string()));
        }
        v.state = ValidatorState::Inactive;
        v.jailed_until = None;
        v.consecutive_missed = 0;
        Ok(())
    }

    /// Release every validator whose jail term has expired. Returns the
    /// addresses released.
    pub fn release_expired_jails(&mut self, now: Timestamp) -> Vec<Address> {
        let expired: Vec<Address> = self
            .validators
            .values()
            .filter(|v| {
                v.state == ValidatorState::Jailed && v.jailed_until.is_some_and(|t| now >= t)
            })
            .map(|v| v.address)
            .collect();
        for address in &expired {
            let _ = self.unjail(address);
            info!(validator = %address, "jail expired");
        }
        expired
    }

    /// Permanent exclusion. Reputation zeroes; no transition ever leaves
    /// this state.
    pub fn tombstone(&mut self, address: &Address) -> Result<(), Bt2cError> {
        let v = self.get_mut(address)?;
        v.state = ValidatorState::Tombstoned;
        v.tombstoned = true;
        v.reputation_milli = 0;
        warn!(validator = %address, "validator tombstoned");
        Ok(())
    }

    /// Set the stake outright; deactivates (but retains) a validator that
    /// falls below the minimum.
    pub fn update_stake(&mut self, address: &Address, new_stake: Amount) -> Result<(), Bt2cError> {
        let min_stake = self.min_stake;
        let v = self.get_mut(address)?;
        v.stake = new_stake;
        if new_stake < min_stake && v.state == ValidatorState::Active {
            v.state = ValidatorState::Inactive;
            warn!(validator = %address, stake = new_stake, "stake fell below minimum, deactivated");
        }
        Ok(())
    }

    // ── Commit-time reputation updates ───────────────────────────────────────

    /// Successful proposal: `r ← min(R_max, r·(1−d) + Δ⁺)`, with Δ⁺ weighted
    /// by the validator's declared accuracy and uptime.
    pub fn record_produced(&mut self, address: &Address) -> Result<(), Bt2cError> {
        let v = self.get_mut(address)?;
        v.blocks_produced += 1;
        v.consecutive_missed = 0;
        let weight_bp = (v.accuracy_bp as u64 + v.uptime_bp as u64) / 2;
        let bump = REPUTATION_SUCCESS_DELTA_MILLI * weight_bp / 10_000;
        v.reputation_milli = (v.decayed() + bump).min(R_MAX_MILLI);
        Ok(())
    }

    /// Missed or failed proposal: `r ← max(0, r·(1−d) − Δ⁻)`. Returns true
    /// when the miss crossed `max_missed` and the validator was jailed.
    pub fn record_missed(
        &mut self,
        address: &Address,
        max_missed: u32,
        jail_until: Timestamp,
    ) -> Result<bool, Bt2cError> {
        let v = self.get_mut(address)?;
        v.blocks_missed += 1;
        v.consecutive_missed += 1;
        v.reputation_milli = v.decayed().saturating_sub(REPUTATION_FAILURE_DELTA_MILLI);
        let should_jail = v.consecutive_missed > max_missed && v.state == ValidatorState::Active;
        if should_jail {
            self.jail(address, jail_until)?;
        }
        Ok(should_jail)
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn get(&self, address: &Address) -> Option<&Validator> {
        self.validators.get(address)
    }

    fn get_mut(&mut self, address: &Address) -> Result<&mut Validator, Bt2cError> {
        self.validators
            .get_mut(address)
            .ok_or_else(|| Bt2cError::UnknownValidator(address.to_string()))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.validators.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Eligible validators in address order (the election ordering).
    pub fn eligible(&self) -> Vec<&Validator> {
        self.validators
            .values()
            .filter(|v| v.is_eligible(self.min_stake))
            .collect()
    }

    pub fn eligible_count(&self) -> usize {
        self.eligible().len()
    }

    pub fn total_stake(&self) -> Amount {
        self.validators.values().map(|v| v.stake).sum()
    }

    /// Votes required for a quorum: ⌈2/3 · n⌉, computed as `(2n + 2) / 3`.
    pub fn vote_threshold(&self) -> usize {
        let n = self.eligible_count();
        (2 * n + 2) / 3
    }

    pub fn iter(&self) -> impl Iterator<Item = &Validator> {
        self.validators.values()
    }

    /// Mark the bootstrap flags set when a registration lands inside the
    /// distribution window.
    pub fn mark_distribution_joined(
        &mut self,
        address: &Address,
        is_first: bool,
    ) -> Result<(), Bt2cError> {
        let v = self.get_mut(address)?;
        v.joined_during_distribution = true;
        v.distribution_reward_claimed = true;
        v.is_first_validator = is_first;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bt2c_core::constants::SATS_PER_BT2C;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    fn registry_with(n: u8) -> ValidatorRegistry {
        let mut reg = ValidatorRegistry::new(SATS_PER_BT2C);
        for i in 1..=n {
            reg.register(addr(i), PublicKey(vec![i; 4]), 10 * SATS_PER_BT2C, format!("v{i}"))
                .unwrap();
            reg.activate(&addr(i)).unwrap();
        }
        reg
    }

    #[test]
    fn register_duplicate_rejected() {
        let mut reg = registry_with(1);
        assert!(matches!(
            reg.register(addr(1), PublicKey(vec![]), 10 * SATS_PER_BT2C, "dup"),
            Err(Bt2cError::ValidatorExists(_))
        ));
    }

    #[test]
    fn register_below_min_stake_rejected() {
        let mut reg = ValidatorRegistry::new(SATS_PER_BT2C);
        assert!(matches!(
            reg.register(addr(1), PublicKey(vec![]), SATS_PER_BT2C - 1, "small"),
            Err(Bt2cError::StakeBelowMinimum { .. })
        ));
    }

    #[test]
    fn closed_registry_rejects() {
        let mut reg = ValidatorRegistry::new(SATS_PER_BT2C);
        reg.close();
        assert!(matches!(
            reg.register(addr(1), PublicKey(vec![]), SATS_PER_BT2C, "late"),
            Err(Bt2cError::RegistryClosed)
        ));
    }

    #[test]
    fn new_validators_start_inactive() {
        let mut reg = ValidatorRegistry::new(SATS_PER_BT2C);
        reg.register(addr(1), PublicKey(vec![]), SATS_PER_BT2C, "v")
            .unwrap();
        assert_eq!(reg.get(&addr(1)).unwrap().state, ValidatorState::Inactive);
        assert_eq!(reg.eligible_count(), 0);
        reg.activate(&addr(1)).unwrap();
        assert_eq!(reg.eligible_count(), 1);
    }

    #[test]
    fn vote_threshold_two_thirds() {
        // 9 eligible validators → threshold = ceil(6) = 6; 1 → 1.
        assert_eq!(registry_with(9).vote_threshold(), 6);
        assert_eq!(registry_with(1).vote_threshold(), 1);
        assert_eq!(registry_with(4).vote_threshold(), 3);
    }

    #[test]
    fn produced_raises_and_missed_lowers_reputation() {
        let mut reg = registry_with(1);
        let before = reg.get(&addr(1)).unwrap().reputation_milli;

        reg.record_produced(&addr(1)).unwrap();
        let after_produce = reg.get(&addr(1)).unwrap().reputation_milli;
        assert!(after_produce > before);

        reg.record_missed(&addr(1), 50, 9_999).unwrap();
        let after_miss = reg.get(&addr(1)).unwrap().reputation_milli;
        assert!(after_miss < after_produce);
    }

    #[test]
    fn reputation_capped_at_r_max() {
        let mut reg = registry_with(1);
        for _ in 0..200 {
            reg.record_produced(&addr(1)).unwrap();
        }
        assert!(reg.get(&addr(1)).unwrap().reputation_milli <= R_MAX_MILLI);
    }

    #[test]
    fn misses_past_limit_jail_the_validator() {
        let mut reg = registry_with(1);
        let mut jailed = false;
        for _ in 0..=3 {
            jailed = reg.record_missed(&addr(1), 3, 5_000).unwrap();
        }
        assert!(jailed);
        let v = reg.get(&addr(1)).unwrap();
        assert_eq!(v.state, ValidatorState::Jailed);
        assert_eq!(v.jailed_until, Some(5_000));
        assert_eq!(reg.eligible_count(), 0);
    }

    #[test]
    fn jail_halves_reputation_and_expires() {
        let mut reg = registry_with(1);
        let before = reg.get(&addr(1)).unwrap().reputation_milli;
        reg.jail(&addr(1), 5_000).unwrap();
        assert_eq!(reg.get(&addr(1)).unwrap().reputation_milli, before / 2);

        assert!(reg.release_expired_jails(4_999).is_empty());
        let released = reg.release_expired_jails(5_000);
        assert_eq!(released, vec![addr(1)]);
        // Jail expiry lands in Inactive, not Active.
        assert_eq!(reg.get(&addr(1)).unwrap().state, ValidatorState::Inactive);
    }

    #[test]
    fn tombstone_is_permanent() {
        let mut reg = registry_with(1);
        reg.tombstone(&addr(1)).unwrap();
        let v = reg.get(&addr(1)).unwrap();
        assert_eq!(v.reputation_milli, 0);
        assert!(v.tombstoned);
        assert!(matches!(
            reg.activate(&addr(1)),
            Err(Bt2cError::ValidatorTombstoned(_))
        ));
        assert!(matches!(
            reg.unjail(&addr(1)),
            Err(Bt2cError::ValidatorTombstoned(_))
        ));
    }

    #[test]
    fn stake_below_minimum_deactivates_but_retains() {
        let mut reg = registry_with(1);
        reg.update_stake(&addr(1), SATS_PER_BT2C / 2).unwrap();
        let v = reg.get(&addr(1)).unwrap();
        assert_eq!(v.state, ValidatorState::Inactive);
        assert!(reg.contains(&addr(1)));
    }
}
