//! Address-indexed side-store.
//!
//! An optional projection of the account-model chain: address → the
//! transactions that touched it, by height. Used for fast address queries
//! only — the account state machine stays authoritative. Persisted to
//! `utxo.dat`, compacted on its own cycle, rolled back together with the
//! chain on reorgs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bt2c_core::error::Bt2cError;
use bt2c_core::types::{Address, Height, TxHash};
use bt2c_core::Block;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Serializable content of the side-store; checkpoints may embed it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AddressIndexSnapshot {
    pub entries: HashMap<Address, Vec<(Height, TxHash)>>,
}

/// Address → tx-hash projection with durable storage.
pub struct AddressIndex {
    path: PathBuf,
    entries: HashMap<Address, Vec<(Height, TxHash)>>,
    /// Mutations since the last save; compaction resets it.
    dirty: usize,
}

impl AddressIndex {
    /// Open or create the side-store file (`utxo.dat` in the data dir).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Bt2cError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let bytes = std::fs::read(&path).map_err(|e| Bt2cError::Storage(e.to_string()))?;
            let snap: AddressIndexSnapshot = bincode::deserialize(&bytes)
                .map_err(|e| Bt2cError::CorruptIndex(e.to_string()))?;
            snap.entries
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            entries,
            dirty: 0,
        })
    }

    /// Record every address touched by a committed block. Called inside the
    /// same commit path as state application so the projection never skews.
    pub fn index_block(&mut self, block: &Block) {
        for tx in &block.transactions {
            let hash = tx.hash();
            if !tx.is_coinbase() {
                self.entries
                    .entry(tx.sender)
                    .or_default()
                    .push((block.height, hash));
            }
            self.entries
                .entry(tx.recipient)
                .or_default()
                .push((block.height, hash));
            self.dirty += 1;
        }
        debug!(height = block.height, "side-store indexed block");
    }

    /// Transactions that touched `address`, oldest first.
    pub fn txs_for(&self, address: &Address) -> Vec<(Height, TxHash)> {
        self.entries.get(address).cloned().unwrap_or_default()
    }

    /// Drop entries above `height` — the reorg path.
    pub fn rollback_above(&mut self, height: Height) {
        for list in self.entries.values_mut() {
            list.retain(|(h, _)| *h <= height);
        }
        self.entries.retain(|_, list| !list.is_empty());
        self.dirty += 1;
    }

    /// Compaction cycle: drop duplicates, sort by height, persist.
    pub fn compact(&mut self) -> Result<(), Bt2cError> {
        for list in self.entries.values_mut() {
            list.sort();
            list.dedup();
        }
        self.save()?;
        info!(addresses = self.entries.len(), "side-store compacted");
        Ok(())
    }

    pub fn save(&mut self) -> Result<(), Bt2cError> {
        let snap = AddressIndexSnapshot {
            entries: self.entries.clone(),
        };
        let bytes =
            bincode::serialize(&snap).map_err(|e| Bt2cError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("dat.tmp");
        std::fs::write(&tmp, &bytes).map_err(|e| Bt2cError::Storage(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| Bt2cError::Storage(e.to_string()))?;
        self.dirty = 0;
        Ok(())
    }

    pub fn pending_mutations(&self) -> usize {
        self.dirty
    }

    pub fn snapshot(&self) -> AddressIndexSnapshot {
        AddressIndexSnapshot {
            entries: self.entries.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: AddressIndexSnapshot) {
        self.entries = snapshot.entries;
        self.dirty += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt2c_core::transaction::Transaction;
    use bt2c_core::types::BlockHash;

    fn temp_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bt2c_side_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("utxo.dat")
    }

    fn block_at(height: Height, recipient: Address) -> Block {
        let cb = Transaction::coinbase(recipient, 100, height as i64);
        Block::new(height, BlockHash::ZERO, height as i64, vec![cb], recipient)
    }

    #[test]
    fn index_and_query() {
        let addr = Address::from_bytes([1u8; 32]);
        let mut idx = AddressIndex::open(temp_file("query")).unwrap();
        idx.index_block(&block_at(1, addr));
        idx.index_block(&block_at(2, addr));
        assert_eq!(idx.txs_for(&addr).len(), 2);
        assert!(idx.txs_for(&Address::from_bytes([9u8; 32])).is_empty());
    }

    #[test]
    fn rollback_drops_reorged_entries() {
        let addr = Address::from_bytes([1u8; 32]);
        let mut idx = AddressIndex::open(temp_file("rollback")).unwrap();
        idx.index_block(&block_at(1, addr));
        idx.index_block(&block_at(5, addr));
        idx.rollback_above(3);
        let txs = idx.txs_for(&addr);
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].0, 1);
    }

    #[test]
    fn compact_persists_and_reloads() {
        let path = temp_file("compact");
        let addr = Address::from_bytes([1u8; 32]);
        {
            let mut idx = AddressIndex::open(&path).unwrap();
            idx.index_block(&block_at(1, addr));
            idx.index_block(&block_at(1, addr)); // duplicate, compacted away
            idx.compact().unwrap();
        }
        let idx = AddressIndex::open(&path).unwrap();
        assert_eq!(idx.txs_for(&addr).len(), 1);
    }
}
