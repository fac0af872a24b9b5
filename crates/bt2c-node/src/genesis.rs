//! Genesis construction.
//!
//! Builds the height-0 block and seeds the founding validator directly into
//! the state, registry and store — no signatures, no votes. This is the one
//! place value enters the ledger outside the reward schedule, and the
//! distribution-period clock starts here.

use bt2c_consensus::ValidatorRegistry;
use bt2c_core::error::Bt2cError;
use bt2c_core::types::{Amount, PublicKey, TimestampMs};
use bt2c_core::Block;
use bt2c_crypto::address_from_pubkey;
use bt2c_state::StateMachine;
use bt2c_storage::BlockStore;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Parameters of a network's genesis. Shared as JSON between the operators
/// of a new network; every node must load the identical file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisParams {
    /// Founding validator's public key (the developer node).
    pub validator_public_key: PublicKey,
    /// Founding stake (satoshis), granted at genesis outside the reward
    /// supply.
    pub validator_stake: Amount,
    pub moniker: String,
    /// Genesis block timestamp (milliseconds).
    pub timestamp_ms: TimestampMs,
}

/// The deterministic height-0 block for `params`.
pub fn genesis_block(params: &GenesisParams) -> Block {
    let proposer = address_from_pubkey(&params.validator_public_key.0);
    Block::new(
        0,
        bt2c_core::types::BlockHash::ZERO,
        params.timestamp_ms,
        vec![],
        proposer,
    )
}

/// Seed the pre-block genesis state: founding stake, registration,
/// activation, and the developer's distribution credit (issued through the
/// state machine, the single authoritative path).
pub fn seed_genesis(
    state: &mut StateMachine,
    registry: &mut ValidatorRegistry,
    params: &GenesisParams,
) -> Result<(), Bt2cError> {
    let address = address_from_pubkey(&params.validator_public_key.0);

    // The distribution window opens at the genesis block, whatever the
    // wall clock says; anchor it before any credit is considered.
    let genesis_secs = params.timestamp_ms / 1_000;
    state.set_genesis_timestamp(genesis_secs);

    state.seed_genesis_stake(address, params.validator_stake);
    registry.register(
        address,
        params.validator_public_key.clone(),
        params.validator_stake,
        params.moniker.clone(),
    )?;
    registry.activate(&address)?;

    // The founding registration lands at the very start of the window, so
    // the developer credit must issue; a fresh ledger without it would be
    // short of the bootstrap supply.
    match state.grant_distribution_reward(address, genesis_secs)? {
        Some(credit) => {
            registry.mark_distribution_joined(&address, true)?;
            registry.update_stake(&address, state.stake_of(&address))?;
            info!(validator = %address, credit, "developer distribution credit");
        }
        None => {
            return Err(Bt2cError::GenesisSupplyMismatch {
                expected: state.config().developer_reward,
                got: 0,
            })
        }
    }
    Ok(())
}

/// Apply genesis to fresh state, registry and store.
pub fn apply_genesis(
    state: &mut StateMachine,
    registry: &mut ValidatorRegistry,
    store: &mut BlockStore,
    params: &GenesisParams,
) -> Result<(), Bt2cError> {
    let address = address_from_pubkey(&params.validator_public_key.0);
    info!(validator = %address, stake = params.validator_stake, "applying genesis");

    seed_genesis(state, registry, params)?;

    let block = genesis_block(params);
    store.append(&block)?;
    state.apply_block(&block)?;

    verify_genesis_supply(state)?;
    store.sync()?;
    info!(hash = %block.hash(), "genesis committed");
    Ok(())
}

/// The genesis ledger equation must balance exactly.
fn verify_genesis_supply(state: &StateMachine) -> Result<(), Bt2cError> {
    let held = state.sum_balances() + state.sum_stakes();
    let issued = state.minted_supply() + state.genesis_stake();
    if held != issued {
        return Err(Bt2cError::GenesisSupplyMismatch {
            expected: issued,
            got: held,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt2c_core::constants::SATS_PER_BT2C;
    use bt2c_crypto::KeyPair;
    use bt2c_state::ChainConfig;
    use bt2c_storage::StoreConfig;

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("bt2c_genesis_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn genesis_seeds_validator_and_balances() {
        let kp = KeyPair::generate();
        let params = GenesisParams {
            validator_public_key: kp.public_key.clone(),
            validator_stake: 10 * SATS_PER_BT2C,
            moniker: "developer".into(),
            timestamp_ms: 1_000,
        };
        let dir = temp_dir("seeds");
        let mut state = StateMachine::new(ChainConfig::default());
        let mut registry = ValidatorRegistry::new(SATS_PER_BT2C);
        let mut store = BlockStore::open(&dir, StoreConfig::default()).unwrap();

        apply_genesis(&mut state, &mut registry, &mut store, &params).unwrap();

        assert_eq!(state.height(), Some(0));
        assert_eq!(store.current_height(), Some(0));
        assert_eq!(store.current_hash(), state.tip_hash());

        // Founding stake + 100 BT2C developer credit, all on stake.
        let dev_reward = ChainConfig::default().developer_reward;
        assert_eq!(state.stake_of(&kp.address), 10 * SATS_PER_BT2C + dev_reward);
        assert_eq!(state.minted_supply(), dev_reward);

        let v = registry.get(&kp.address).unwrap();
        assert!(v.is_first_validator);
        assert!(v.distribution_reward_claimed);
        assert_eq!(v.stake, 10 * SATS_PER_BT2C + dev_reward);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn distribution_window_opens_at_a_realistic_genesis_time() {
        use bt2c_core::types::Address;

        let kp = KeyPair::generate();
        // 2023-11-14 UTC — far past fourteen days after the epoch, which is
        // where an unanchored window would have closed.
        let genesis_secs: i64 = 1_700_000_000;
        let params = GenesisParams {
            validator_public_key: kp.public_key.clone(),
            validator_stake: 10 * SATS_PER_BT2C,
            moniker: "developer".into(),
            timestamp_ms: genesis_secs * 1_000,
        };
        let dir = temp_dir("realistic");
        let mut state = StateMachine::new(ChainConfig::default());
        let mut registry = ValidatorRegistry::new(SATS_PER_BT2C);
        let mut store = BlockStore::open(&dir, StoreConfig::default()).unwrap();

        apply_genesis(&mut state, &mut registry, &mut store, &params).unwrap();

        // The developer credit was issued at genesis.
        let chain = ChainConfig::default();
        assert_eq!(state.minted_supply(), chain.developer_reward);

        // A registrant thirteen days in still collects the early credit;
        // one day after the window closes, nobody does.
        let late_joiner = Address::from_bytes([9u8; 32]);
        assert_eq!(
            state
                .grant_distribution_reward(late_joiner, genesis_secs + 13 * 24 * 3600)
                .unwrap(),
            Some(chain.early_validator_reward)
        );
        let too_late = Address::from_bytes([8u8; 32]);
        assert_eq!(
            state
                .grant_distribution_reward(too_late, genesis_secs + 15 * 24 * 3600)
                .unwrap(),
            None
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn genesis_block_is_deterministic() {
        let kp = KeyPair::generate();
        let params = GenesisParams {
            validator_public_key: kp.public_key.clone(),
            validator_stake: SATS_PER_BT2C,
            moniker: "developer".into(),
            timestamp_ms: 42,
        };
        assert_eq!(genesis_block(&params).hash(), genesis_block(&params).hash());
    }
}
