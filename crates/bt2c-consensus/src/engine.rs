//! The rPoS round engine.
//!
//! One logical task drives the `(height, round)` state machine:
//! `Syncing → Waiting → Proposing → Validating → Voting → Finalizing`.
//! Everything arrives through a single mpsc queue — gossip from peers,
//! lifecycle commands — and phase deadlines are re-derived on every loop
//! turn, so advancing the round implicitly cancels stale timers.
//!
//! The engine holds the validator registry and talks to the rest of the
//! node through the [`CommitPipeline`] capability the integration layer
//! injects (store append, state apply, mempool drain/evict). Outbound
//! gossip and typed events flow through channels the integration layer
//! consumes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bt2c_core::error::Bt2cError;
use bt2c_core::types::{Address, BlockHash, Height, Round};
use bt2c_core::Block;
use bt2c_crypto::KeyPair;
use bt2c_crypto::sign::verify_signature;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ConsensusConfig;
use crate::election::select_proposer;
use crate::events::ConsensusEvent;
use crate::registry::ValidatorRegistry;
use crate::slashing::{apply_offense, Offense, SlashOutcome};
use crate::votes::{RecordOutcome, Vote, VoteKind, VoteTracker};

// ── Capabilities ─────────────────────────────────────────────────────────────

/// What the engine needs from the rest of the node. The integration layer
/// implements this over the store, state machine and mempool; `commit` is
/// expected to carry its own bounded retry policy — an error from it is
/// fatal and halts the engine.
pub trait CommitPipeline: Send {
    /// Durably append and apply `block`, evict its transactions, settle
    /// reward accounting.
    fn commit(&mut self, block: &Block) -> Result<(), Bt2cError>;

    /// Validate a candidate against a fresh snapshot of committed state.
    fn validate(&self, block: &Block) -> Result<(), Bt2cError>;

    /// Build an unsigned candidate block (coinbase first) on the committed
    /// tip.
    fn build_block(
        &mut self,
        height: Height,
        parent: BlockHash,
        proposer: Address,
    ) -> Result<Block, Bt2cError>;

    /// The committed tip.
    fn tip(&self) -> (Option<Height>, BlockHash);
}

// ── Queue types ──────────────────────────────────────────────────────────────

/// Inbound queue: lifecycle commands and peer messages. The integration
/// layer has already verified envelope signatures and sender identity.
#[derive(Debug)]
pub enum EngineInput {
    Start,
    Stop,
    Proposal { block: Block },
    Vote { vote: Vote },
    CommittedBlock { block: Block },
}

/// Outbound gossip; the integration layer wraps these in signed wire
/// envelopes.
#[derive(Clone, Debug)]
pub enum GossipOut {
    Proposal(Block),
    Vote(Vote),
    Commit(Block),
}

/// Channels the integration layer holds after constructing an engine.
pub struct EngineHandle {
    pub input_tx: mpsc::Sender<EngineInput>,
    pub gossip_rx: mpsc::Receiver<GossipOut>,
    pub events_rx: mpsc::Receiver<ConsensusEvent>,
}

// ── Engine ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Not yet participating: waiting for genesis or enough validators.
    Syncing,
    /// Pacing between commits.
    Waiting,
    Proposing,
    /// Waiting for (or checking) the proposer's block.
    Validating,
    /// Prevote exchange.
    Voting,
    /// Precommit exchange.
    Finalizing,
}

pub struct ConsensusEngine<P: CommitPipeline> {
    config: ConsensusConfig,
    registry: Arc<RwLock<ValidatorRegistry>>,
    pipeline: P,
    /// Our validator identity; `None` runs a passive peer.
    keypair: Option<Arc<KeyPair>>,

    inbound: mpsc::Receiver<EngineInput>,
    gossip_tx: mpsc::Sender<GossipOut>,
    events_tx: mpsc::Sender<ConsensusEvent>,

    phase: Phase,
    started: bool,
    stopped: bool,
    height: Height,
    round: Round,
    proposer: Option<Address>,
    tracker: VoteTracker,
    /// Blocks proposed this round, by hash.
    proposals: HashMap<BlockHash, Block>,
    precommitted: bool,
    deadline: Option<Instant>,
}

impl<P: CommitPipeline> ConsensusEngine<P> {
    pub fn new(
        config: ConsensusConfig,
        registry: Arc<RwLock<ValidatorRegistry>>,
        pipeline: P,
        keypair: Option<Arc<KeyPair>>,
    ) -> (Self, EngineHandle) {
        let (input_tx, inbound) = mpsc::channel(256);
        let (gossip_tx, gossip_rx) = mpsc::channel(256);
        let (events_tx, events_rx) = mpsc::channel(256);
        let engine = Self {
            config,
            registry,
            pipeline,
            keypair,
            inbound,
            gossip_tx,
            events_tx,
            phase: Phase::Syncing,
            started: false,
            stopped: false,
            height: 0,
            round: 0,
            proposer: None,
            tracker: VoteTracker::new(0, 0),
            proposals: HashMap::new(),
            precommitted: false,
            deadline: None,
        };
        let handle = EngineHandle {
            input_tx,
            gossip_rx,
            events_rx,
        };
        (engine, handle)
    }

    fn our_address(&self) -> Option<Address> {
        self.keypair.as_ref().map(|kp| kp.address)
    }

    /// Best-effort event publication: observers that fall behind lose
    /// events, never state.
    fn emit(&self, event: ConsensusEvent) {
        if self.events_tx.try_send(event).is_err() {
            debug!("event channel full, observer event dropped");
        }
    }

    async fn gossip(&self, out: GossipOut) {
        let _ = self.gossip_tx.send(out).await;
    }

    // ── Main loop ────────────────────────────────────────────────────────────

    /// Drive the engine until `Stop` arrives or the queue closes. Run on a
    /// dedicated tokio task.
    pub async fn run(mut self) {
        while !self.stopped {
            let deadline = self.deadline;
            tokio::select! {
                maybe = self.inbound.recv() => match maybe {
                    Some(input) => self.handle_input(input).await,
                    None => break,
                },
                _ = sleep_until_opt(deadline) => self.on_deadline().await,
            }
        }
        // Drain anything still queued so senders are not left blocked.
        while self.inbound.try_recv().is_ok() {}
        info!("consensus engine stopped");
    }

    async fn handle_input(&mut self, input: EngineInput) {
        match input {
            EngineInput::Start => self.on_start().await,
            EngineInput::Stop => {
                // Idempotent: a second stop is a no-op.
                if !self.stopped {
                    self.stopped = true;
                    self.deadline = None;
                }
            }
            EngineInput::Proposal { block } => self.on_proposal(block).await,
            EngineInput::Vote { vote } => self.on_vote(vote).await,
            EngineInput::CommittedBlock { block } => self.on_committed_block(block).await,
        }
    }

    async fn on_start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.start_next_height().await;
    }

    /// Position at the height above the committed tip and begin round 0.
    async fn start_next_height(&mut self) {
        let (tip_height, _) = self.pipeline.tip();
        match tip_height {
            Some(h) => {
                self.height = h + 1;
                self.begin_round(0).await;
            }
            None => {
                // No genesis yet: stay in Syncing and re-check on a pace.
                self.phase = Phase::Syncing;
                self.arm(self.config.block_time_ms);
            }
        }
    }

    // ── Round lifecycle ──────────────────────────────────────────────────────

    async fn begin_round(&mut self, round: Round) {
        self.round = round;
        self.tracker = VoteTracker::new(self.height, round);
        self.proposals.clear();
        self.precommitted = false;

        let now = chrono::Utc::now().timestamp();
        let (_, parent_hash) = self.pipeline.tip();

        let proposer = {
            let mut registry = self.registry.write().expect("registry lock");
            registry.release_expired_jails(now);
            if registry.eligible_count() < self.config.min_validators {
                drop(registry);
                debug!(height = self.height, "not enough eligible validators, waiting");
                self.phase = Phase::Waiting;
                self.arm(self.config.block_time_ms);
                return;
            }
            select_proposer(&registry.eligible(), self.height, round, &parent_hash)
        };

        self.proposer = proposer;
        match proposer {
            None => {
                self.phase = Phase::Waiting;
                self.arm(self.config.block_time_ms);
            }
            Some(p) if Some(p) == self.our_address() => {
                self.phase = Phase::Proposing;
                self.propose(parent_hash).await;
            }
            Some(p) => {
                debug!(height = self.height, round, proposer = %p, "awaiting proposal");
                self.phase = Phase::Validating;
                self.arm(self.config.proposal_timeout_ms);
            }
        }
    }

    /// We are the proposer: drain the pool, build, sign, broadcast, prevote.
    /// A build failure leaves the round to its proposal deadline, which
    /// fails it through the normal path.
    async fn propose(&mut self, parent_hash: BlockHash) {
        let our = self.our_address().expect("proposer has a keypair");
        let mut block = match self.pipeline.build_block(self.height, parent_hash, our) {
            Ok(block) => block,
            Err(e) => {
                warn!(error = %e, "failed to build block");
                self.arm(self.config.proposal_timeout_ms);
                return;
            }
        };
        let keypair = self.keypair.clone().expect("proposer has a keypair");
        block.signature = keypair.sign(&block.header_bytes());
        let hash = block.hash();

        self.emit(ConsensusEvent::BlockProposed {
            height: self.height,
            round: self.round,
            hash,
            proposer: our,
        });
        self.gossip(GossipOut::Proposal(block.clone())).await;
        self.proposals.insert(hash, block);

        self.phase = Phase::Voting;
        self.arm(self.config.voting_timeout_ms);
        self.cast_vote(VoteKind::Prevote, Some(hash)).await;
        self.advance().await;
    }

    /// A proposal arrived for the current round.
    async fn on_proposal(&mut self, block: Block) {
        if !self.started {
            return;
        }
        if !matches!(
            self.phase,
            Phase::Validating | Phase::Voting | Phase::Finalizing
        ) {
            return;
        }
        if block.height != self.height {
            return;
        }
        if Some(block.proposer) != self.proposer {
            debug!(
                height = self.height,
                claimed = %block.proposer,
                "proposal from non-elected proposer ignored"
            );
            return;
        }
        let hash = block.hash();
        if self.proposals.contains_key(&hash) {
            return;
        }

        // A second, different proposal for the same round from the elected
        // proposer is double-signing. The round is left to resolve (or time
        // out) on the first proposal.
        if !self.proposals.is_empty() {
            self.punish(block.proposer, Offense::DoubleSigning).await;
            return;
        }

        // The proposer must have signed the header.
        let signer_key = {
            let registry = self.registry.read().expect("registry lock");
            registry.get(&block.proposer).map(|v| v.public_key.clone())
        };
        let signature_ok = signer_key
            .map(|key| verify_signature(&key, &block.header_bytes(), &block.signature).is_ok())
            .unwrap_or(false);

        if self.phase == Phase::Validating {
            let prevote = if !signature_ok {
                self.emit(ConsensusEvent::BlockRejected {
                    height: self.height,
                    hash,
                    reason: "bad proposer signature".into(),
                });
                None
            } else {
                match self.pipeline.validate(&block) {
                    Ok(()) => {
                        self.proposals.insert(hash, block);
                        Some(hash)
                    }
                    Err(e) => {
                        self.emit(ConsensusEvent::BlockRejected {
                            height: self.height,
                            hash,
                            reason: e.to_string(),
                        });
                        None
                    }
                }
            };
            self.phase = Phase::Voting;
            self.arm(self.config.voting_timeout_ms);
            self.cast_vote(VoteKind::Prevote, prevote).await;
        } else if signature_ok && self.pipeline.validate(&block).is_ok() {
            // Late but valid proposal: cache it so a precommit quorum can
            // still commit. Our ballots for this round are already cast.
            self.proposals.insert(hash, block);
        }
        self.advance().await;
    }

    /// Record our own ballot and gossip it.
    async fn cast_vote(&mut self, kind: VoteKind, block_hash: Option<BlockHash>) {
        let Some(our) = self.our_address() else {
            return;
        };
        let eligible = {
            let registry = self.registry.read().expect("registry lock");
            registry
                .get(&our)
                .is_some_and(|v| v.is_eligible(registry.min_stake()))
        };
        if !eligible {
            return;
        }
        let vote = Vote {
            kind,
            height: self.height,
            round: self.round,
            block_hash,
            voter: our,
        };
        if self.tracker.record(&vote) == RecordOutcome::Recorded {
            self.emit(ConsensusEvent::VoteCast { vote: vote.clone() });
            self.gossip(GossipOut::Vote(vote)).await;
        }
    }

    /// A peer ballot arrived. The integration layer already verified the
    /// envelope signature and that it matches `vote.voter`.
    async fn on_vote(&mut self, vote: Vote) {
        if !self.started {
            return;
        }
        let known_validator = {
            let registry = self.registry.read().expect("registry lock");
            registry.contains(&vote.voter)
        };
        if !known_validator {
            debug!(voter = %vote.voter, "vote from unknown validator ignored");
            return;
        }
        match self.tracker.record(&vote) {
            RecordOutcome::Recorded => self.advance().await,
            RecordOutcome::Duplicate | RecordOutcome::WrongRound => {}
            RecordOutcome::Conflict => {
                self.punish(vote.voter, Offense::DoubleSigning).await;
            }
        }
    }

    /// Advance phases as quorums land. Iterative so a single vote can carry
    /// the round from prevote quorum through precommit to commit.
    async fn advance(&mut self) {
        loop {
            let threshold = {
                let registry = self.registry.read().expect("registry lock");
                registry.vote_threshold()
            };
            match self.phase {
                Phase::Voting => {
                    let Some(hash) = self.tracker.prevote_quorum(threshold) else {
                        return;
                    };
                    self.enter_finalizing(Some(hash)).await;
                }
                Phase::Finalizing => {
                    let Some(hash) = self.tracker.precommit_quorum(threshold) else {
                        return;
                    };
                    self.commit(hash).await;
                    return;
                }
                _ => return,
            }
        }
    }

    /// Prevote phase resolved (quorum or timeout): cast our precommit.
    /// We precommit the quorum hash only if it is what we prevoted.
    async fn enter_finalizing(&mut self, quorum_hash: Option<BlockHash>) {
        if self.precommitted {
            self.phase = Phase::Finalizing;
            return;
        }
        self.precommitted = true;
        self.phase = Phase::Finalizing;
        self.arm(self.config.finalization_timeout_ms);

        let ours = self
            .our_address()
            .and_then(|our| self.tracker.prevote_of(&our))
            .flatten();
        let precommit = match quorum_hash {
            Some(hash) if ours == Some(hash) => Some(hash),
            _ => None,
        };
        self.cast_vote(VoteKind::Precommit, precommit).await;
    }

    // ── Commit ───────────────────────────────────────────────────────────────

    async fn commit(&mut self, hash: BlockHash) {
        let Some(block) = self.proposals.get(&hash).cloned() else {
            // Quorum for a block we never saw; the finalization timeout
            // will fail the round and redraw.
            warn!(height = self.height, hash = %hash, "precommit quorum for unseen block");
            return;
        };

        match self.pipeline.commit(&block) {
            Ok(()) => self.after_commit(block).await,
            Err(e) => self.halt(format!("commit failed at height {}: {e}", self.height)),
        }
    }

    async fn after_commit(&mut self, block: Block) {
        {
            let mut registry = self.registry.write().expect("registry lock");
            let _ = registry.record_produced(&block.proposer);
        }
        let reward = block.coinbase().map(|cb| cb.amount).unwrap_or(0);
        self.emit(ConsensusEvent::BlockAccepted {
            height: block.height,
            hash: block.hash(),
            proposer: block.proposer,
            tx_count: block.transactions.len(),
        });
        if reward > 0 {
            self.emit(ConsensusEvent::RewardIssued {
                recipient: block.proposer,
                amount: reward,
                height: block.height,
            });
        }
        info!(height = block.height, hash = %block.hash(), "block committed");
        self.gossip(GossipOut::Commit(block)).await;

        self.height += 1;
        self.round = 0;
        self.proposals.clear();
        self.tracker = VoteTracker::new(self.height, 0);
        self.precommitted = false;
        // Pace the next height to the target block time.
        self.phase = Phase::Waiting;
        self.arm(self.config.block_time_ms);
    }

    /// A finalized block arrived via gossip — the passive-peer / catch-up
    /// path. Applies only if it extends the committed tip.
    async fn on_committed_block(&mut self, block: Block) {
        if !self.started {
            return;
        }
        let (tip_height, _) = self.pipeline.tip();
        let next = tip_height.map(|h| h + 1).unwrap_or(0);
        if block.height != next {
            return;
        }
        if let Err(e) = self.pipeline.validate(&block) {
            warn!(height = block.height, error = %e, "gossiped block failed validation");
            return;
        }
        match self.pipeline.commit(&block) {
            Ok(()) => {
                {
                    let mut registry = self.registry.write().expect("registry lock");
                    let _ = registry.record_produced(&block.proposer);
                }
                self.emit(ConsensusEvent::BlockAccepted {
                    height: block.height,
                    hash: block.hash(),
                    proposer: block.proposer,
                    tx_count: block.transactions.len(),
                });
                self.height = block.height + 1;
                self.round = 0;
                self.proposals.clear();
                self.tracker = VoteTracker::new(self.height, 0);
                self.precommitted = false;
                self.phase = Phase::Waiting;
                self.arm(self.config.block_time_ms);
            }
            Err(e) => self.halt(format!("commit of gossiped block failed: {e}")),
        }
    }

    // ── Deadlines & failure ──────────────────────────────────────────────────

    fn arm(&mut self, millis: u64) {
        self.deadline = Some(Instant::now() + Duration::from_millis(millis));
    }

    async fn on_deadline(&mut self) {
        self.deadline = None;
        match self.phase {
            Phase::Syncing => self.start_next_height().await,
            Phase::Waiting => self.begin_round(0).await,
            // Proposal never arrived.
            Phase::Validating => self.fail_round().await,
            // Prevote quorum never formed: precommit nil, give the
            // finalization window a chance.
            Phase::Voting => {
                self.enter_finalizing(None).await;
                self.advance().await;
            }
            // Precommit quorum never formed.
            Phase::Finalizing => self.fail_round().await,
            Phase::Proposing => self.fail_round().await,
        }
    }

    /// Round failure: penalize the elected proposer, redraw, restart.
    async fn fail_round(&mut self) {
        self.emit(ConsensusEvent::RoundFailed {
            height: self.height,
            round: self.round,
            proposer: self.proposer,
        });
        if let Some(proposer) = self.proposer {
            let now = chrono::Utc::now().timestamp();
            let jail_until = now + self.config.jail_duration_s;
            let jailed = {
                let mut registry = self.registry.write().expect("registry lock");
                registry
                    .record_missed(&proposer, self.config.max_missed_blocks, jail_until)
                    .unwrap_or(false)
            };
            if jailed {
                self.emit(ConsensusEvent::ValidatorJailed {
                    address: proposer,
                    until: jail_until,
                });
            }
        }
        warn!(height = self.height, round = self.round, "round failed");
        let next_round = self.round + 1;
        self.begin_round(next_round).await;
    }

    /// Offense handling shared by double-sign detection paths.
    async fn punish(&mut self, address: Address, offense: Offense) {
        let now = chrono::Utc::now().timestamp();
        let outcome = {
            let mut registry = self.registry.write().expect("registry lock");
            apply_offense(&mut registry, &address, offense, &self.config, now)
        };
        match outcome {
            Ok(SlashOutcome::Tombstoned) => {
                self.emit(ConsensusEvent::ValidatorTombstoned { address, offense });
            }
            Ok(SlashOutcome::Slashed {
                penalty,
                jailed_until,
            }) => {
                self.emit(ConsensusEvent::ValidatorSlashed {
                    address,
                    offense,
                    penalty,
                });
                self.emit(ConsensusEvent::ValidatorJailed {
                    address,
                    until: jailed_until,
                });
            }
            Err(e) => warn!(validator = %address, error = %e, "failed to apply offense"),
        }
    }

    fn halt(&mut self, reason: String) {
        warn!(reason = %reason, "consensus engine halting");
        self.emit(ConsensusEvent::Halted { reason });
        self.stopped = true;
        self.deadline = None;
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
