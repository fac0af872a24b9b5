//! Coinbase reward schedule: Bitcoin's halving curve over a 21 M cap.

use bt2c_core::types::{Amount, Height};

use crate::config::ChainConfig;

/// The scheduled reward at `height`, before the supply-cap truncation:
/// `max(floor, initial >> (height / halving_interval))`.
pub fn scheduled_reward(config: &ChainConfig, height: Height) -> Amount {
    let halvings = height / config.halving_interval;
    let halved = if halvings >= 64 {
        0
    } else {
        config.initial_block_reward >> halvings
    };
    halved.max(config.floor_reward)
}

/// The reward actually mintable at `height` given how much has been issued:
/// the schedule truncated to the remaining headroom under `max_supply`.
pub fn capped_reward(config: &ChainConfig, height: Height, minted: Amount) -> Amount {
    let headroom = config.max_supply.saturating_sub(minted);
    scheduled_reward(config, height).min(headroom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt2c_core::constants::{INITIAL_BLOCK_REWARD_SATS, MAX_SUPPLY_SATS};

    #[test]
    fn halving_boundary() {
        let cfg = ChainConfig::default();
        let interval = cfg.halving_interval;
        assert_eq!(scheduled_reward(&cfg, interval - 1), INITIAL_BLOCK_REWARD_SATS);
        assert_eq!(scheduled_reward(&cfg, interval), INITIAL_BLOCK_REWARD_SATS / 2);
        assert_eq!(scheduled_reward(&cfg, interval + 1), INITIAL_BLOCK_REWARD_SATS / 2);
        assert_eq!(scheduled_reward(&cfg, 2 * interval), INITIAL_BLOCK_REWARD_SATS / 4);
    }

    #[test]
    fn reward_never_below_floor() {
        let cfg = ChainConfig::default();
        // After 64+ halvings the shifted reward is zero; the floor holds.
        assert_eq!(scheduled_reward(&cfg, cfg.halving_interval * 100), cfg.floor_reward);
    }

    #[test]
    fn reward_truncated_at_the_cap() {
        let cfg = ChainConfig::default();
        let minted = MAX_SUPPLY_SATS - 5;
        assert_eq!(capped_reward(&cfg, 0, minted), 5);
        assert_eq!(capped_reward(&cfg, 0, MAX_SUPPLY_SATS), 0);
    }
}
