use std::collections::HashMap;

use bt2c_core::types::{Address, BlockHash, Height, Round};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ── Vote ─────────────────────────────────────────────────────────────────────

/// The two ballots of the two-phase commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteKind {
    Prevote,
    Precommit,
}

/// One validator ballot for `(height, round)`. `block_hash = None` is the
/// nil vote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub kind: VoteKind,
    pub height: Height,
    pub round: Round,
    pub block_hash: Option<BlockHash>,
    pub voter: Address,
}

/// What recording a vote did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// Same voter, same ballot — idempotent, dropped.
    Duplicate,
    /// Same voter, same `(height, round, kind)`, different hash.
    /// Double-signing evidence.
    Conflict,
    /// Vote for a different `(height, round)` than the tracker's.
    WrongRound,
}

// ── VoteTracker ──────────────────────────────────────────────────────────────

/// Collects prevotes and precommits for one `(height, round)`.
///
/// Each validator gets at most one ballot per kind; replays are dropped and
/// conflicting ballots are surfaced as double-signing evidence.
pub struct VoteTracker {
    height: Height,
    round: Round,
    prevotes: HashMap<Address, Option<BlockHash>>,
    precommits: HashMap<Address, Option<BlockHash>>,
}

impl VoteTracker {
    pub fn new(height: Height, round: Round) -> Self {
        Self {
            height,
            round,
            prevotes: HashMap::new(),
            precommits: HashMap::new(),
        }
    }

    pub fn height(&self) -> Height {
        self.height
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn record(&mut self, vote: &Vote) -> RecordOutcome {
        if vote.height != self.height || vote.round != self.round {
            return RecordOutcome::WrongRound;
        }
        let ballots = match vote.kind {
            VoteKind::Prevote => &mut self.prevotes,
            VoteKind::Precommit => &mut self.precommits,
        };
        match ballots.get(&vote.voter) {
            Some(existing) if *existing == vote.block_hash => RecordOutcome::Duplicate,
            Some(_) => RecordOutcome::Conflict,
            None => {
                ballots.insert(vote.voter, vote.block_hash);
                debug!(
                    height = vote.height,
                    round = vote.round,
                    voter = %vote.voter,
                    kind = ?vote.kind,
                    "vote recorded"
                );
                RecordOutcome::Recorded
            }
        }
    }

    pub fn prevote_count(&self) -> usize {
        self.prevotes.len()
    }

    pub fn precommit_count(&self) -> usize {
        self.precommits.len()
    }

    /// Our own prevote in this round, if cast.
    pub fn prevote_of(&self, voter: &Address) -> Option<Option<BlockHash>> {
        self.prevotes.get(voter).copied()
    }

    /// A block hash with ≥ `threshold` prevotes, if any. The nil ballot
    /// never commits, so nil quorums return `None`.
    pub fn prevote_quorum(&self, threshold: usize) -> Option<BlockHash> {
        quorum(&self.prevotes, threshold)
    }

    pub fn precommit_quorum(&self, threshold: usize) -> Option<BlockHash> {
        quorum(&self.precommits, threshold)
    }
}

fn quorum(ballots: &HashMap<Address, Option<BlockHash>>, threshold: usize) -> Option<BlockHash> {
    let mut counts: HashMap<BlockHash, usize> = HashMap::new();
    for hash in ballots.values().flatten() {
        let count = counts.entry(*hash).or_insert(0);
        *count += 1;
        if *count >= threshold {
            return Some(*hash);
        }
    }
    None
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    fn vote(voter: u8, kind: VoteKind, hash: Option<[u8; 32]>) -> Vote {
        Vote {
            kind,
            height: 3,
            round: 0,
            block_hash: hash.map(BlockHash::from_bytes),
            voter: addr(voter),
        }
    }

    #[test]
    fn quorum_reached_at_threshold() {
        let mut tracker = VoteTracker::new(3, 0);
        let hash = [9u8; 32];
        assert_eq!(tracker.record(&vote(1, VoteKind::Prevote, Some(hash))), RecordOutcome::Recorded);
        assert_eq!(tracker.prevote_quorum(2), None);
        tracker.record(&vote(2, VoteKind::Prevote, Some(hash)));
        assert_eq!(tracker.prevote_quorum(2), Some(BlockHash::from_bytes(hash)));
    }

    #[test]
    fn duplicate_votes_are_idempotent() {
        let mut tracker = VoteTracker::new(3, 0);
        let v = vote(1, VoteKind::Prevote, Some([9u8; 32]));
        assert_eq!(tracker.record(&v), RecordOutcome::Recorded);
        assert_eq!(tracker.record(&v), RecordOutcome::Duplicate);
        assert_eq!(tracker.prevote_count(), 1);
    }

    #[test]
    fn conflicting_votes_are_double_signing_evidence() {
        let mut tracker = VoteTracker::new(3, 0);
        tracker.record(&vote(1, VoteKind::Prevote, Some([1u8; 32])));
        assert_eq!(
            tracker.record(&vote(1, VoteKind::Prevote, Some([2u8; 32]))),
            RecordOutcome::Conflict
        );
    }

    #[test]
    fn nil_votes_count_but_never_commit() {
        let mut tracker = VoteTracker::new(3, 0);
        tracker.record(&vote(1, VoteKind::Precommit, None));
        tracker.record(&vote(2, VoteKind::Precommit, None));
        tracker.record(&vote(3, VoteKind::Precommit, None));
        assert_eq!(tracker.precommit_count(), 3);
        assert_eq!(tracker.precommit_quorum(2), None);
    }

    #[test]
    fn wrong_round_votes_are_ignored() {
        let mut tracker = VoteTracker::new(3, 0);
        let mut v = vote(1, VoteKind::Prevote, Some([9u8; 32]));
        v.round = 1;
        assert_eq!(tracker.record(&v), RecordOutcome::WrongRound);
        assert_eq!(tracker.prevote_count(), 0);
    }

    #[test]
    fn prevote_and_precommit_are_independent_ballots() {
        let mut tracker = VoteTracker::new(3, 0);
        tracker.record(&vote(1, VoteKind::Prevote, Some([9u8; 32])));
        assert_eq!(
            tracker.record(&vote(1, VoteKind::Precommit, Some([9u8; 32]))),
            RecordOutcome::Recorded
        );
    }
}
