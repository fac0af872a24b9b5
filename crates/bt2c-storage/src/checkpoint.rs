//! Checkpoints: signed `(height, hash, state)` snapshots supporting fast
//! sync and trusted recovery.
//!
//! One JSON file per checkpoint under `<data_dir>/checkpoints/`, named
//! `checkpoint_<height>_<timestamp>.json`. Verification accepts either a
//! signature under the configured public key or a block hash on the
//! trusted-checkpoint list (which bypasses the signature).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use bt2c_core::error::Bt2cError;
use bt2c_core::types::{BlockHash, Height, PublicKey};
use bt2c_crypto::KeyPair;
use bt2c_crypto::sign::verify_signature;
use bt2c_state::StateSnapshot;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::side::AddressIndexSnapshot;

// ── Checkpoint ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub height: Height,
    pub block_hash: BlockHash,
    pub previous_hash: BlockHash,
    /// Unix seconds at creation; also part of the file name.
    pub created_at: i64,
    /// Full account-state snapshot at `height`.
    pub state: StateSnapshot,
    /// Side-store projection at `height`, when one is maintained.
    pub utxo_snapshot: Option<AddressIndexSnapshot>,
    /// Detached signature over the checkpoint digest, hex-encoded.
    pub signature: Option<String>,
}

impl Checkpoint {
    pub fn new(
        height: Height,
        block_hash: BlockHash,
        previous_hash: BlockHash,
        created_at: i64,
        state: StateSnapshot,
        utxo_snapshot: Option<AddressIndexSnapshot>,
    ) -> Self {
        Self {
            height,
            block_hash,
            previous_hash,
            created_at,
            state,
            utxo_snapshot,
            signature: None,
        }
    }

    /// Digest covering everything except the signature itself.
    pub fn digest(&self) -> Result<[u8; 32], Bt2cError> {
        #[derive(Serialize)]
        struct Body<'a> {
            height: Height,
            block_hash: &'a BlockHash,
            previous_hash: &'a BlockHash,
            created_at: i64,
            state: &'a StateSnapshot,
            utxo_snapshot: &'a Option<AddressIndexSnapshot>,
        }
        let bytes = bincode::serialize(&Body {
            height: self.height,
            block_hash: &self.block_hash,
            previous_hash: &self.previous_hash,
            created_at: self.created_at,
            state: &self.state,
            utxo_snapshot: &self.utxo_snapshot,
        })
        .map_err(|e| Bt2cError::Serialization(e.to_string()))?;
        Ok(bt2c_crypto::blake3_hash(&bytes))
    }

    /// Sign the digest with the node's key.
    pub fn sign_with(&mut self, keypair: &KeyPair) -> Result<(), Bt2cError> {
        let digest = self.digest()?;
        self.signature = Some(hex::encode(keypair.sign(&digest).0));
        Ok(())
    }
}

// ── CheckpointStore ──────────────────────────────────────────────────────────

/// Owns the checkpoints directory: creation, lookup, verification,
/// retention pruning.
pub struct CheckpointStore {
    dir: PathBuf,
    max_checkpoints: usize,
    trusted_hashes: HashSet<String>,
    /// Public key checkpoints must be signed with, when configured.
    verify_key: Option<PublicKey>,
}

impl CheckpointStore {
    pub fn open<P: AsRef<Path>>(
        data_dir: P,
        max_checkpoints: usize,
        trusted_hashes: &[String],
        verify_key: Option<PublicKey>,
    ) -> Result<Self, Bt2cError> {
        let dir = data_dir.as_ref().join("checkpoints");
        std::fs::create_dir_all(&dir).map_err(|e| Bt2cError::Storage(e.to_string()))?;
        Ok(Self {
            dir,
            max_checkpoints,
            trusted_hashes: trusted_hashes.iter().cloned().collect(),
            verify_key,
        })
    }

    /// Write a checkpoint file and prune beyond the retention limit.
    pub fn create(&self, checkpoint: &Checkpoint) -> Result<PathBuf, Bt2cError> {
        let name = format!(
            "checkpoint_{}_{}.json",
            checkpoint.height, checkpoint.created_at
        );
        let path = self.dir.join(&name);
        let json = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| Bt2cError::Serialization(e.to_string()))?;
        std::fs::write(&path, json).map_err(|e| Bt2cError::Storage(e.to_string()))?;
        info!(height = checkpoint.height, file = %name, "checkpoint created");
        self.prune()?;
        Ok(path)
    }

    /// All checkpoint heights on disk, ascending.
    pub fn heights(&self) -> Result<Vec<Height>, Bt2cError> {
        let mut heights: Vec<Height> = self.files()?.into_iter().map(|(h, _)| h).collect();
        heights.sort_unstable();
        heights.dedup();
        Ok(heights)
    }

    pub fn latest(&self) -> Result<Option<Checkpoint>, Bt2cError> {
        match self.files()?.into_iter().max_by_key(|(h, _)| *h) {
            Some((_, path)) => Ok(Some(self.load(&path)?)),
            None => Ok(None),
        }
    }

    /// The newest checkpoint at or below `height`.
    pub fn nearest_at_or_below(&self, height: Height) -> Result<Option<Checkpoint>, Bt2cError> {
        match self
            .files()?
            .into_iter()
            .filter(|(h, _)| *h <= height)
            .max_by_key(|(h, _)| *h)
        {
            Some((_, path)) => Ok(Some(self.load(&path)?)),
            None => Ok(None),
        }
    }

    /// Verify a checkpoint before restoring to it.
    ///
    /// Trusted block hashes bypass the signature; otherwise a configured
    /// verification key demands a valid signature. With neither configured,
    /// locally created (unsigned) checkpoints are accepted.
    pub fn verify(&self, checkpoint: &Checkpoint) -> Result<(), Bt2cError> {
        if self.trusted_hashes.contains(&checkpoint.block_hash.to_hex()) {
            return Ok(());
        }
        if let Some(key) = &self.verify_key {
            let sig_hex = checkpoint.signature.as_ref().ok_or_else(|| {
                Bt2cError::CheckpointVerificationFailed("checkpoint is unsigned".into())
            })?;
            let sig_bytes = hex::decode(sig_hex).map_err(|e| {
                Bt2cError::CheckpointVerificationFailed(format!("bad signature hex: {e}"))
            })?;
            let digest = checkpoint.digest()?;
            verify_signature(
                key,
                &digest,
                &bt2c_core::types::Signature(sig_bytes),
            )
            .map_err(|_| {
                Bt2cError::CheckpointVerificationFailed("signature does not verify".into())
            })?;
        }
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Checkpoint, Bt2cError> {
        let bytes = std::fs::read(path).map_err(|e| Bt2cError::Storage(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            Bt2cError::CheckpointVerificationFailed(format!("unreadable checkpoint: {e}"))
        })
    }

    /// `(height, path)` for every well-named checkpoint file.
    fn files(&self) -> Result<Vec<(Height, PathBuf)>, Bt2cError> {
        let mut out = Vec::new();
        let entries = std::fs::read_dir(&self.dir).map_err(|e| Bt2cError::Storage(e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| Bt2cError::Storage(e.to_string()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(height) = parse_checkpoint_name(&name) {
                out.push((height, entry.path()));
            }
        }
        Ok(out)
    }

    /// Keep the newest `max_checkpoints`, delete the rest.
    fn prune(&self) -> Result<(), Bt2cError> {
        let mut files = self.files()?;
        if files.len() <= self.max_checkpoints {
            return Ok(());
        }
        files.sort_by_key(|(h, _)| *h);
        let doomed = files.len() - self.max_checkpoints;
        for (height, path) in files.into_iter().take(doomed) {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(height, error = %e, "failed to prune checkpoint");
            }
        }
        Ok(())
    }
}

fn parse_checkpoint_name(name: &str) -> Option<Height> {
    let rest = name.strip_prefix("checkpoint_")?.strip_suffix(".json")?;
    let (height, _ts) = rest.split_once('_')?;
    height.parse().ok()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bt2c_state::{ChainConfig, StateMachine};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bt2c_ckpt_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn checkpoint_at(height: Height, created_at: i64) -> Checkpoint {
        let state = StateMachine::new(ChainConfig::default());
        Checkpoint::new(
            height,
            BlockHash::from_bytes([height as u8; 32]),
            BlockHash::ZERO,
            created_at,
            state.create_snapshot(),
            None,
        )
    }

    #[test]
    fn create_and_find() {
        let dir = temp_dir("find");
        let store = CheckpointStore::open(&dir, 10, &[], None).unwrap();
        store.create(&checkpoint_at(10, 1)).unwrap();
        store.create(&checkpoint_at(20, 2)).unwrap();
        store.create(&checkpoint_at(30, 3)).unwrap();

        assert_eq!(store.latest().unwrap().unwrap().height, 30);
        assert_eq!(
            store.nearest_at_or_below(25).unwrap().unwrap().height,
            20
        );
        assert!(store.nearest_at_or_below(5).unwrap().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn retention_prunes_oldest() {
        let dir = temp_dir("retention");
        let store = CheckpointStore::open(&dir, 2, &[], None).unwrap();
        for h in [10u64, 20, 30, 40] {
            store.create(&checkpoint_at(h, h as i64)).unwrap();
        }
        assert_eq!(store.heights().unwrap(), vec![30, 40]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn signed_checkpoint_verifies() {
        let dir = temp_dir("signed");
        let kp = KeyPair::generate();
        let store =
            CheckpointStore::open(&dir, 10, &[], Some(kp.public_key.clone())).unwrap();

        let mut ck = checkpoint_at(10, 1);
        ck.sign_with(&kp).unwrap();
        store.verify(&ck).unwrap();

        // Tampering after signing breaks verification.
        ck.height = 11;
        assert!(matches!(
            store.verify(&ck).unwrap_err(),
            Bt2cError::CheckpointVerificationFailed(_)
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unsigned_rejected_when_key_configured() {
        let dir = temp_dir("unsigned");
        let kp = KeyPair::generate();
        let store =
            CheckpointStore::open(&dir, 10, &[], Some(kp.public_key.clone())).unwrap();
        assert!(store.verify(&checkpoint_at(10, 1)).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn trusted_hash_bypasses_signature() {
        let dir = temp_dir("trusted");
        let kp = KeyPair::generate();
        let ck = checkpoint_at(10, 1);
        let trusted = vec![ck.block_hash.to_hex()];
        let store =
            CheckpointStore::open(&dir, 10, &trusted, Some(kp.public_key.clone())).unwrap();
        store.verify(&ck).unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }
}
