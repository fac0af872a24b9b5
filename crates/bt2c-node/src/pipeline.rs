//! The commit pipeline the node injects into the consensus engine.
//!
//! One place wires C5 append, C4 apply, C6 eviction, the validator-set
//! sync, checkpointing and the side-store update into the engine's commit
//! path. Only the engine task ever holds more than one of the component
//! locks at a time, so the lock graph stays acyclic.

use std::sync::{Arc, Mutex, RwLock};

use bt2c_consensus::engine::CommitPipeline;
use bt2c_consensus::ValidatorRegistry;
use bt2c_core::error::Bt2cError;
use bt2c_core::transaction::{Transaction, TxKind};
use bt2c_core::types::{Address, BlockHash, Height};
use bt2c_core::Block;
use bt2c_crypto::KeyPair;
use bt2c_mempool::Mempool;
use bt2c_state::{capped_reward, run_checks, StateCheck, StateMachine};
use bt2c_storage::{AddressIndex, BlockStore, Checkpoint, CheckpointStore};
use tracing::{info, warn};

const APPEND_ATTEMPTS: u32 = 3;

pub struct NodePipeline {
    pub state: Arc<Mutex<StateMachine>>,
    pub store: Arc<Mutex<BlockStore>>,
    pub mempool: Arc<Mutex<Mempool>>,
    pub side: Option<Arc<Mutex<AddressIndex>>>,
    pub checkpoints: Arc<CheckpointStore>,
    pub registry: Arc<RwLock<ValidatorRegistry>>,
    /// Signs checkpoints when present.
    pub keypair: Option<Arc<KeyPair>>,
    pub checkpoint_interval: u64,
    pub max_block_txs: usize,
    pub max_block_bytes: usize,
    pub checks: Vec<StateCheck>,
}

impl NodePipeline {
    /// Register, activate and restake validators according to the stake
    /// movements in a committed block. Registration through an on-chain
    /// stake transaction is what makes the validator set identical on every
    /// node; the distribution credit rides on it, clocked by the block
    /// timestamp.
    pub fn sync_validators(
        state: &mut StateMachine,
        registry: &mut ValidatorRegistry,
        block: &Block,
    ) -> Result<(), Bt2cError> {
        for tx in &block.transactions {
            if !matches!(tx.kind, TxKind::Stake | TxKind::Unstake) {
                continue;
            }
            let staked = state.stake_of(&tx.sender);
            if registry.contains(&tx.sender) {
                registry.update_stake(&tx.sender, staked)?;
                continue;
            }
            if tx.kind != TxKind::Stake || staked < registry.min_stake() {
                continue;
            }

            registry.register(tx.sender, tx.sender_public_key.clone(), staked, "")?;
            registry.activate(&tx.sender)?;
            info!(validator = %tx.sender, stake = staked, "validator joined via stake");

            let block_secs = block.timestamp_ms / 1_000;
            if let Some(credit) = state.grant_distribution_reward(tx.sender, block_secs)? {
                let is_first = state.first_validator() == Some(tx.sender);
                registry.mark_distribution_joined(&tx.sender, is_first)?;
                registry.update_stake(&tx.sender, state.stake_of(&tx.sender))?;
                info!(validator = %tx.sender, credit, "early validator credit");
            }
        }
        Ok(())
    }

    fn maybe_checkpoint(&self, block: &Block) -> Result<(), Bt2cError> {
        if self.checkpoint_interval == 0
            || block.height == 0
            || block.height % self.checkpoint_interval != 0
        {
            return Ok(());
        }
        let snapshot = self.state.lock().expect("state lock").create_snapshot();
        let utxo = self
            .side
            .as_ref()
            .map(|side| side.lock().expect("side lock").snapshot());
        let mut checkpoint = Checkpoint::new(
            block.height,
            block.hash(),
            block.previous_hash,
            chrono::Utc::now().timestamp(),
            snapshot,
            utxo,
        );
        if let Some(keypair) = &self.keypair {
            checkpoint.sign_with(keypair)?;
        }
        self.checkpoints.create(&checkpoint)?;
        self.store
            .lock()
            .expect("store lock")
            .set_checkpoint_floor(block.height);
        Ok(())
    }
}

impl CommitPipeline for NodePipeline {
    fn commit(&mut self, block: &Block) -> Result<(), Bt2cError> {
        // 1. Durable append, with a bounded retry before giving up.
        {
            let mut store = self.store.lock().expect("store lock");
            let mut attempt = 0;
            loop {
                match store.append(block) {
                    Ok(()) => break,
                    Err(e @ Bt2cError::AppendFailed(_)) if attempt + 1 < APPEND_ATTEMPTS => {
                        attempt += 1;
                        warn!(height = block.height, error = %e, attempt, "append failed, retrying");
                    }
                    Err(e) => return Err(e),
                }
            }
            store.sync()?;
        }

        // 2. Apply to state; a failure here after a durable append is an
        //    engine-halting inconsistency (the block already prevote-
        //    validated against this same state).
        {
            let mut state = self.state.lock().expect("state lock");
            state.apply_block(block)?;
            let mut registry = self.registry.write().expect("registry lock");
            Self::sync_validators(&mut state, &mut registry, block)?;
            run_checks(&state, &self.checks)?;
        }

        // 3. Reconcile the mempool and the address projection.
        self.mempool
            .lock()
            .expect("mempool lock")
            .on_block_committed(block);
        if let Some(side) = &self.side {
            side.lock().expect("side lock").index_block(block);
        }

        // 4. Scheduled checkpoint.
        self.maybe_checkpoint(block)?;
        Ok(())
    }

    fn validate(&self, block: &Block) -> Result<(), Bt2cError> {
        self.state.lock().expect("state lock").check_block(block)
    }

    fn build_block(
        &mut self,
        height: Height,
        parent: BlockHash,
        proposer: Address,
    ) -> Result<Block, Bt2cError> {
        let state = self.state.lock().expect("state lock");
        let now = chrono::Utc::now();

        let transactions = {
            let mempool = self.mempool.lock().expect("mempool lock");
            mempool.select_for_block(
                self.max_block_txs.saturating_sub(1),
                self.max_block_bytes,
                |address| state.expected_nonce(address),
                now.timestamp(),
            )
        };

        let fees: u64 = transactions.iter().map(|tx| tx.fee).sum();
        let reward = capped_reward(state.config(), height, state.minted_supply());
        let coinbase = Transaction::coinbase(proposer, reward + fees, now.timestamp());

        let timestamp_ms = now.timestamp_millis().max(state.last_timestamp_ms());
        let mut all = Vec::with_capacity(transactions.len() + 1);
        all.push(coinbase);
        all.extend(transactions);
        Ok(Block::new(height, parent, timestamp_ms, all, proposer))
    }

    fn tip(&self) -> (Option<Height>, BlockHash) {
        let state = self.state.lock().expect("state lock");
        (state.height(), state.tip_hash())
    }
}
