//! Node integration: owns every subsystem, wires the consensus engine to
//! the store, state, mempool and network, and runs the background
//! schedules (mempool eviction, store fsync, pruning, side-store
//! compaction).
//!
//! Startup sequence:
//!   1. Open the block log and checkpoint store
//!   2. Fresh data dir → apply genesis; otherwise restore the latest
//!      verified checkpoint and replay the chain tail
//!   3. Spawn the engine and its relay loops
//!   4. Start background schedules

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use bt2c_consensus::engine::{ConsensusEngine, EngineHandle, EngineInput, GossipOut};
use bt2c_consensus::{ConsensusEvent, Validator, ValidatorRegistry};
use bt2c_core::error::Bt2cError;
use bt2c_core::transaction::Transaction;
use bt2c_core::types::{Address, Amount, BlockHash, Height, Nonce};
use bt2c_crypto::{address_from_pubkey, KeyPair};
use bt2c_mempool::{AdmitOutcome, Mempool, MempoolStats};
use bt2c_network::{Network, PeerId, SignedEnvelope, WireMessage};
use bt2c_state::{standard_checks, StateMachine};
use bt2c_storage::{AddressIndex, BlockStore, CheckpointStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::genesis::{apply_genesis, seed_genesis, GenesisParams};
use crate::pipeline::NodePipeline;

/// A running BT2C node.
pub struct Node {
    keypair: Arc<KeyPair>,
    state: Arc<Mutex<StateMachine>>,
    store: Arc<Mutex<BlockStore>>,
    mempool: Arc<Mutex<Mempool>>,
    side: Option<Arc<Mutex<AddressIndex>>>,
    registry: Arc<RwLock<ValidatorRegistry>>,
    network: Arc<dyn Network>,
    engine_input: mpsc::Sender<EngineInput>,
    engine_task: Option<JoinHandle<()>>,
    background: Vec<JoinHandle<()>>,
}

impl Node {
    /// Open the data directory, restore or create the chain, and start the
    /// consensus engine. Returns the node and its public event stream.
    pub async fn start(
        data_dir: impl AsRef<Path>,
        mut config: NodeConfig,
        keypair: KeyPair,
        genesis: GenesisParams,
        network: Arc<dyn Network>,
        inbound: mpsc::Receiver<(PeerId, SignedEnvelope)>,
    ) -> Result<(Self, mpsc::Receiver<ConsensusEvent>), Bt2cError> {
        let data_dir: PathBuf = data_dir.as_ref().to_path_buf();
        let keypair = Arc::new(keypair);

        // The distribution window is anchored to the genesis block on every
        // path — fresh genesis, full replay, and checkpoint restore (which
        // skips `seed_genesis`) all build their state from this config.
        config.chain.genesis_timestamp = genesis.timestamp_ms / 1_000;

        // ── Storage, state, registry ─────────────────────────────────────────
        let mut store = BlockStore::open(&data_dir, config.store.clone())?;
        let checkpoints = Arc::new(CheckpointStore::open(
            &data_dir,
            config.store.max_checkpoints,
            &config.store.trusted_checkpoints,
            None,
        )?);
        let mut state = StateMachine::new(config.chain.clone());
        let mut registry = ValidatorRegistry::new(config.consensus.min_stake);

        bootstrap(&mut state, &mut registry, &mut store, &checkpoints, &genesis)?;

        let state = Arc::new(Mutex::new(state));
        let store = Arc::new(Mutex::new(store));
        let mempool = Arc::new(Mutex::new(Mempool::new(config.mempool.clone())));
        let registry = Arc::new(RwLock::new(registry));
        let side = match config.address_index {
            true => Some(Arc::new(Mutex::new(AddressIndex::open(
                data_dir.join("utxo.dat"),
            )?))),
            false => None,
        };

        // ── Engine ───────────────────────────────────────────────────────────
        let pipeline = NodePipeline {
            state: state.clone(),
            store: store.clone(),
            mempool: mempool.clone(),
            side: side.clone(),
            checkpoints: checkpoints.clone(),
            registry: registry.clone(),
            keypair: Some(keypair.clone()),
            checkpoint_interval: config.store.checkpoint_interval,
            max_block_txs: config.consensus.max_block_txs,
            max_block_bytes: config.consensus.max_block_bytes,
            checks: standard_checks(),
        };
        let engine_keypair = config.validator.then(|| keypair.clone());
        let (engine, handle) = ConsensusEngine::new(
            config.consensus.clone(),
            registry.clone(),
            pipeline,
            engine_keypair,
        );
        let EngineHandle {
            input_tx,
            gossip_rx,
            events_rx,
        } = handle;
        let engine_task = tokio::spawn(engine.run());

        let mut background = Vec::new();
        background.push(spawn_gossip_relay(gossip_rx, network.clone(), keypair.clone()));
        background.push(spawn_inbound_router(
            inbound,
            input_tx.clone(),
            state.clone(),
            mempool.clone(),
        ));
        let (public_events_tx, public_events_rx) = mpsc::channel(256);
        background.push(spawn_event_relay(events_rx, public_events_tx, state.clone()));
        background.push(spawn_mempool_sweeper(
            mempool.clone(),
            config.mempool.eviction_interval_s,
        ));
        background.push(spawn_store_syncer(
            store.clone(),
            config.store.sync_interval_ms,
        ));
        if let Some(side) = side.clone() {
            background.push(spawn_side_compactor(side));
        }
        background.push(spawn_invariant_checker(state.clone()));

        input_tx
            .send(EngineInput::Start)
            .await
            .map_err(|_| Bt2cError::EngineHalted("engine queue closed at start".into()))?;
        info!(address = %keypair.address, validator = config.validator, "node started");

        Ok((
            Self {
                keypair,
                state,
                store,
                mempool,
                side,
                registry,
                network,
                engine_input: input_tx,
                engine_task: Some(engine_task),
                background,
            },
            public_events_rx,
        ))
    }

    // ── Public surface ───────────────────────────────────────────────────────

    pub fn address(&self) -> Address {
        self.keypair.address
    }

    /// Admit a locally submitted transaction and gossip it.
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<AdmitOutcome, Bt2cError> {
        let state_nonce = self
            .state
            .lock()
            .expect("state lock")
            .expected_nonce(&tx.sender);
        let now = chrono::Utc::now().timestamp();
        let outcome = self
            .mempool
            .lock()
            .expect("mempool lock")
            .admit(tx.clone(), state_nonce, now)?;

        let envelope = SignedEnvelope::seal(&self.keypair, &WireMessage::tx(&tx));
        if let Err(e) = self.network.broadcast(envelope).await {
            warn!(error = %e, "failed to gossip transaction");
        }
        Ok(outcome)
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.state.lock().expect("state lock").balance(address)
    }

    pub fn stake_of(&self, address: &Address) -> Amount {
        self.state.lock().expect("state lock").stake_of(address)
    }

    pub fn expected_nonce(&self, address: &Address) -> Nonce {
        self.state
            .lock()
            .expect("state lock")
            .expected_nonce(address)
    }

    pub fn height(&self) -> Option<Height> {
        self.state.lock().expect("state lock").height()
    }

    pub fn tip_hash(&self) -> BlockHash {
        self.state.lock().expect("state lock").tip_hash()
    }

    pub fn minted_supply(&self) -> Amount {
        self.state.lock().expect("state lock").minted_supply()
    }

    pub fn mempool_stats(&self) -> MempoolStats {
        let now = chrono::Utc::now().timestamp();
        self.mempool.lock().expect("mempool lock").stats(now)
    }

    pub fn validator(&self, address: &Address) -> Option<Validator> {
        self.registry
            .read()
            .expect("registry lock")
            .get(address)
            .cloned()
    }

    /// Transactions that touched an address, when the side-store is on.
    pub fn address_history(&self, address: &Address) -> Vec<(Height, bt2c_core::types::TxHash)> {
        self.side
            .as_ref()
            .map(|side| side.lock().expect("side lock").txs_for(address))
            .unwrap_or_default()
    }

    /// Stop the engine, cancel background schedules and flush storage.
    /// Idempotent from the engine's point of view.
    pub async fn stop(mut self) -> Result<(), Bt2cError> {
        let _ = self.engine_input.send(EngineInput::Stop).await;
        if let Some(task) = self.engine_task.take() {
            let _ = task.await;
        }
        for task in self.background.drain(..) {
            task.abort();
        }
        self.store.lock().expect("store lock").sync()?;
        if let Some(side) = &self.side {
            side.lock().expect("side lock").save()?;
        }
        info!("node stopped");
        Ok(())
    }
}

// ── Bootstrap ────────────────────────────────────────────────────────────────

/// Bring state and registry up to the store's tip: fresh genesis, or
/// checkpoint restore + tail replay, or full replay.
fn bootstrap(
    state: &mut StateMachine,
    registry: &mut ValidatorRegistry,
    store: &mut BlockStore,
    checkpoints: &CheckpointStore,
    genesis: &GenesisParams,
) -> Result<(), Bt2cError> {
    let Some(tip) = store.current_height() else {
        return apply_genesis(state, registry, store, genesis);
    };
    info!(tip, "existing chain found, restoring");

    let mut replay_from = 0;
    match checkpoints.latest()? {
        Some(ck) if ck.height <= tip => match checkpoints.verify(&ck) {
            Ok(()) => {
                state.restore_snapshot(ck.state.clone());
                store.set_checkpoint_floor(ck.height);
                replay_from = ck.height + 1;
                info!(height = ck.height, "restored from checkpoint");
            }
            Err(e) => warn!(error = %e, "checkpoint failed verification, replaying from genesis"),
        },
        _ => {}
    }

    if replay_from == 0 {
        seed_genesis(state, registry, genesis)?;
    } else {
        // The state came from the checkpoint; the registry still needs the
        // genesis validator and the stake registrations from the blocks
        // below it.
        let address = address_from_pubkey(&genesis.validator_public_key.0);
        registry.register(
            address,
            genesis.validator_public_key.clone(),
            state.stake_of(&address),
            genesis.moniker.clone(),
        )?;
        registry.activate(&address)?;
        if state.has_claimed_distribution(&address) {
            registry.mark_distribution_joined(&address, state.first_validator() == Some(address))?;
        }
        for height in 0..replay_from {
            let block = store
                .get_by_height(height)?
                .ok_or_else(|| Bt2cError::CorruptIndex(format!("missing block {height}")))?;
            NodePipeline::sync_validators(state, registry, &block)?;
        }
    }

    for height in replay_from..=tip {
        let block = store
            .get_by_height(height)?
            .ok_or_else(|| Bt2cError::CorruptIndex(format!("missing block {height}")))?;
        state.apply_block(&block)?;
        NodePipeline::sync_validators(state, registry, &block)?;
    }
    info!(height = tip, "chain replayed");
    Ok(())
}

// ── Relay loops & background schedules ───────────────────────────────────────

fn spawn_gossip_relay(
    mut gossip_rx: mpsc::Receiver<GossipOut>,
    network: Arc<dyn Network>,
    keypair: Arc<KeyPair>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(out) = gossip_rx.recv().await {
            let message = match out {
                GossipOut::Proposal(block) => WireMessage::proposal(&block),
                GossipOut::Vote(vote) => WireMessage::Vote { vote },
                GossipOut::Commit(block) => WireMessage::commit(&block),
            };
            let envelope = SignedEnvelope::seal(&keypair, &message);
            if let Err(e) = network.broadcast(envelope).await {
                warn!(error = %e, "gossip broadcast failed");
            }
        }
    })
}

fn spawn_inbound_router(
    mut inbound: mpsc::Receiver<(PeerId, SignedEnvelope)>,
    engine_input: mpsc::Sender<EngineInput>,
    state: Arc<Mutex<StateMachine>>,
    mempool: Arc<Mutex<Mempool>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some((peer, envelope)) = inbound.recv().await {
            let message = match envelope.open() {
                Ok(message) => message,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "rejecting unverifiable envelope");
                    continue;
                }
            };
            match message {
                WireMessage::TxGossip { payload } => match WireMessage::decode_tx(&payload) {
                    Ok(tx) => {
                        let state_nonce =
                            state.lock().expect("state lock").expected_nonce(&tx.sender);
                        let now = chrono::Utc::now().timestamp();
                        if let Err(e) =
                            mempool.lock().expect("mempool lock").admit(tx, state_nonce, now)
                        {
                            debug!(peer = %peer, error = %e, "gossiped transaction rejected");
                        }
                    }
                    Err(e) => warn!(peer = %peer, error = %e, "undecodable transaction gossip"),
                },
                WireMessage::Proposal { payload } => match WireMessage::decode_block(&payload) {
                    Ok(block) => {
                        let _ = engine_input.send(EngineInput::Proposal { block }).await;
                    }
                    Err(e) => warn!(peer = %peer, error = %e, "undecodable proposal"),
                },
                WireMessage::Vote { vote } => {
                    // The ballot must come from the validator it names.
                    if envelope.sender != vote.voter {
                        warn!(peer = %peer, voter = %vote.voter, "vote sender mismatch");
                        continue;
                    }
                    let _ = engine_input.send(EngineInput::Vote { vote }).await;
                }
                WireMessage::BlockCommit { payload } => match WireMessage::decode_block(&payload) {
                    Ok(block) => {
                        let _ = engine_input
                            .send(EngineInput::CommittedBlock { block })
                            .await;
                    }
                    Err(e) => warn!(peer = %peer, error = %e, "undecodable block commit"),
                },
            }
        }
    })
}

fn spawn_event_relay(
    mut events_rx: mpsc::Receiver<ConsensusEvent>,
    public_tx: mpsc::Sender<ConsensusEvent>,
    state: Arc<Mutex<StateMachine>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            // Slashing decisions mirror into the ledger so conservation
            // holds: the burned stake leaves the stake table.
            if let ConsensusEvent::ValidatorSlashed {
                address, penalty, ..
            } = &event
            {
                state
                    .lock()
                    .expect("state lock")
                    .slash_stake(address, *penalty);
            }
            // Observers that fall behind lose events, never state.
            let _ = public_tx.try_send(event);
        }
    })
}

fn spawn_mempool_sweeper(mempool: Arc<Mutex<Mempool>>, interval_s: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(interval_s.max(1)));
        loop {
            tick.tick().await;
            let now = chrono::Utc::now().timestamp();
            mempool.lock().expect("mempool lock").sweep(now);
        }
    })
}

fn spawn_store_syncer(store: Arc<Mutex<BlockStore>>, interval_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(interval_ms.max(10)));
        let mut ticks: u64 = 0;
        loop {
            tick.tick().await;
            ticks += 1;
            let mut store = store.lock().expect("store lock");
            if let Err(e) = store.sync() {
                warn!(error = %e, "periodic store sync failed");
            }
            // Pruning rides the sync schedule at a much lower cadence.
            if ticks % 60 == 0 {
                if let Err(e) = store.prune() {
                    warn!(error = %e, "pruning failed");
                }
            }
        }
    })
}

/// The ledger checks also run on a slow periodic sweep, independent of the
/// commit path, so a silent corruption surfaces even on an idle chain.
fn spawn_invariant_checker(state: Arc<Mutex<StateMachine>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let checks = standard_checks();
        let mut tick = tokio::time::interval(Duration::from_secs(30));
        loop {
            tick.tick().await;
            let state = state.lock().expect("state lock");
            if let Err(e) = bt2c_state::run_checks(&state, &checks) {
                warn!(error = %e, "periodic ledger check failed");
            }
        }
    })
}

fn spawn_side_compactor(side: Arc<Mutex<AddressIndex>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            let mut side = side.lock().expect("side lock");
            if side.pending_mutations() > 0 {
                if let Err(e) = side.compact() {
                    warn!(error = %e, "side-store compaction failed");
                }
            }
        }
    })
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bt2c_core::constants::SATS_PER_BT2C;
    use bt2c_state::ChainConfig;
    use bt2c_storage::StoreConfig;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bt2c_bootstrap_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn params(kp: &KeyPair) -> GenesisParams {
        GenesisParams {
            validator_public_key: kp.public_key.clone(),
            validator_stake: 10 * SATS_PER_BT2C,
            moniker: "developer".into(),
            timestamp_ms: 1_000,
        }
    }

    #[test]
    fn bootstrap_replays_existing_chain() {
        let dir = temp_dir("replay");
        let kp = KeyPair::generate();
        let genesis = params(&kp);

        // Build a small chain: genesis plus two reward blocks.
        let (tip_hash, expected_balance) = {
            let mut state = StateMachine::new(ChainConfig::default());
            let mut registry = ValidatorRegistry::new(SATS_PER_BT2C);
            let mut store = BlockStore::open(&dir, StoreConfig::default()).unwrap();
            let checkpoints = CheckpointStore::open(&dir, 10, &[], None).unwrap();
            bootstrap(&mut state, &mut registry, &mut store, &checkpoints, &genesis).unwrap();

            for height in 1..=2u64 {
                let reward = bt2c_state::capped_reward(
                    state.config(),
                    height,
                    state.minted_supply(),
                );
                let coinbase = Transaction::coinbase(kp.address, reward, height as i64);
                let mut block = bt2c_core::Block::new(
                    height,
                    state.tip_hash(),
                    1_000 + height as i64,
                    vec![coinbase],
                    kp.address,
                );
                block.signature = kp.sign(&block.header_bytes());
                store.append(&block).unwrap();
                state.apply_block(&block).unwrap();
            }
            store.sync().unwrap();
            (state.tip_hash(), state.balance(&kp.address))
        };

        // A fresh process over the same data dir replays to the same state.
        let mut state = StateMachine::new(ChainConfig::default());
        let mut registry = ValidatorRegistry::new(SATS_PER_BT2C);
        let mut store = BlockStore::open(&dir, StoreConfig::default()).unwrap();
        let checkpoints = CheckpointStore::open(&dir, 10, &[], None).unwrap();
        bootstrap(&mut state, &mut registry, &mut store, &checkpoints, &genesis).unwrap();

        assert_eq!(state.height(), Some(2));
        assert_eq!(state.tip_hash(), tip_hash);
        assert_eq!(state.balance(&kp.address), expected_balance);
        assert!(registry.contains(&kp.address));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
