use bt2c_core::error::Bt2cError;
use bt2c_core::types::{Address, Amount, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ConsensusConfig;
use crate::registry::ValidatorRegistry;

// ── Offenses ─────────────────────────────────────────────────────────────────

/// Punishable validator behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Offense {
    /// Two signed proposals or conflicting ballots for one `(height, round)`.
    DoubleSigning,
    /// A proposal that fails validation against the committed state.
    InvalidProposal,
    /// Extended unavailability beyond the missed-block jail policy.
    Downtime,
}

impl Offense {
    /// The configuration name of this offense (`tombstoning_offenses` list).
    pub fn name(&self) -> &'static str {
        match self {
            Offense::DoubleSigning => "double_signing",
            Offense::InvalidProposal => "invalid_proposal",
            Offense::Downtime => "downtime",
        }
    }
}

/// Offense classes are fixed at configuration time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Stake reduced by the slashing penalty; jailed for twice the term.
    Slashable,
    /// Permanent exclusion.
    Tombstonable,
}

pub fn classify(offense: Offense, config: &ConsensusConfig) -> Severity {
    if config
        .tombstoning_offenses
        .iter()
        .any(|name| name == offense.name())
    {
        Severity::Tombstonable
    } else {
        Severity::Slashable
    }
}

/// What an applied offense did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlashOutcome {
    Slashed {
        /// Stake to burn; the state machine performs the burn.
        penalty: Amount,
        jailed_until: Timestamp,
    },
    Tombstoned,
}

/// Apply an offense to the registry. The returned penalty (if any) must be
/// mirrored into the state machine's stake by the integration layer so
/// conservation holds.
pub fn apply_offense(
    registry: &mut ValidatorRegistry,
    address: &Address,
    offense: Offense,
    config: &ConsensusConfig,
    now: Timestamp,
) -> Result<SlashOutcome, Bt2cError> {
    match classify(offense, config) {
        Severity::Tombstonable => {
            warn!(validator = %address, offense = offense.name(), "tombstonable offense");
            registry.tombstone(address)?;
            Ok(SlashOutcome::Tombstoned)
        }
        Severity::Slashable => {
            let stake = registry
                .get(address)
                .ok_or_else(|| Bt2cError::UnknownValidator(address.to_string()))?
                .stake;
            let penalty = stake * config.slashing_penalty_bp / 10_000;
            let jailed_until = now + 2 * config.jail_duration_s;
            warn!(
                validator = %address,
                offense = offense.name(),
                penalty,
                "slashable offense"
            );
            registry.update_stake(address, stake - penalty)?;
            registry.jail(address, jailed_until)?;
            Ok(SlashOutcome::Slashed {
                penalty,
                jailed_until,
            })
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
