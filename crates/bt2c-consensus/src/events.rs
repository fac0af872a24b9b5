use bt2c_core::types::{Address, Amount, BlockHash, Height, Round, Timestamp};
use serde::{Deserialize, Serialize};

use crate::slashing::Offense;
use crate::votes::Vote;

/// Typed events the engine publishes to the integration layer, which relays
/// them to metrics, gossip and external storage.
///
/// Delivery is best-effort on a bounded channel: observers that fall behind
/// lose events (never state). The commit path itself is synchronous and
/// lossless.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ConsensusEvent {
    BlockProposed {
        height: Height,
        round: Round,
        hash: BlockHash,
        proposer: Address,
    },
    VoteCast {
        vote: Vote,
    },
    BlockAccepted {
        height: Height,
        hash: BlockHash,
        proposer: Address,
        tx_count: usize,
    },
    BlockRejected {
        height: Height,
        hash: BlockHash,
        reason: String,
    },
    RoundFailed {
        height: Height,
        round: Round,
        proposer: Option<Address>,
    },
    ValidatorJailed {
        address: Address,
        until: Timestamp,
    },
    ValidatorSlashed {
        address: Address,
        offense: Offense,
        penalty: Amount,
    },
    ValidatorTombstoned {
        address: Address,
        offense: Offense,
    },
    RewardIssued {
        recipient: Address,
        amount: Amount,
        height: Height,
    },
    Halted {
        reason: String,
    },
}
