//! The append-only block log.
//!
//! Layout per data directory:
//!   blocks.dat   — magic + format version, then per-block gzip frames,
//!                  each prefixed with its compressed length (u32 BE)
//!   index.dat    — bincode: height → locator, block hash → height
//!   archive/     — pruned frames in `blocks_<n>.dat` chunks, still served
//!                  transparently through the index
//!
//! The log has a single writer (enforced by `&mut self` ownership); readers
//! go through the index. Newer minor format versions must read older data —
//! the version tag in the header gates that.

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bt2c_core::codec::CanonicalEncode;
use bt2c_core::constants::BLOCK_LOG_VERSION;
use bt2c_core::error::Bt2cError;
use bt2c_core::types::{BlockHash, Height};
use bt2c_core::Block;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::StoreConfig;

const LOG_MAGIC: &[u8; 4] = b"BT2C";
const HEADER_LEN: u64 = 6; // magic + u16 version

// ── Locators ─────────────────────────────────────────────────────────────────

/// Which physical file a frame lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileId {
    Main,
    Archive(u32),
}

/// Position of one compressed block frame.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BlockLocator {
    pub file: FileId,
    /// Offset of the frame payload (past the length prefix).
    pub offset: u64,
    /// Compressed payload length.
    pub len: u32,
}

#[derive(Default, Serialize, Deserialize)]
struct LogIndex {
    by_height: BTreeMap<Height, BlockLocator>,
    by_hash: HashMap<BlockHash, Height>,
}

// ── BlockStore ───────────────────────────────────────────────────────────────

/// Append-only compressed block log with height/hash indices.
pub struct BlockStore {
    config: StoreConfig,
    dir: PathBuf,
    file: File,
    end_offset: u64,
    index: LogIndex,
    tip: Option<(Height, BlockHash)>,
    /// Height of the most recent checkpoint; reorgs never cross it.
    checkpoint_floor: Option<Height>,
}

impl BlockStore {
    /// Open or create the block log at `dir`.
    ///
    /// A missing or unreadable index is rebuilt by scanning the log; a torn
    /// tail write (crash mid-append) is detected and truncated away.
    pub fn open<P: AsRef<Path>>(dir: P, config: StoreConfig) -> Result<Self, Bt2cError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(storage_err)?;
        std::fs::create_dir_all(dir.join("archive")).map_err(storage_err)?;

        let path = dir.join("blocks.dat");
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(storage_err)?;

        let file_len = file.metadata().map_err(storage_err)?.len();
        if file_len == 0 {
            file.write_all(LOG_MAGIC).map_err(storage_err)?;
            file.write_all(&BLOCK_LOG_VERSION.to_be_bytes())
                .map_err(storage_err)?;
            file.sync_data().map_err(storage_err)?;
        } else {
            let mut magic = [0u8; 4];
            let mut version = [0u8; 2];
            file.seek(SeekFrom::Start(0)).map_err(storage_err)?;
            file.read_exact(&mut magic).map_err(storage_err)?;
            file.read_exact(&mut version).map_err(storage_err)?;
            if &magic != LOG_MAGIC {
                return Err(Bt2cError::CorruptIndex("bad log magic".into()));
            }
            let version = u16::from_be_bytes(version);
            if version > BLOCK_LOG_VERSION {
                return Err(Bt2cError::CorruptIndex(format!(
                    "log format v{version} is newer than supported v{BLOCK_LOG_VERSION}"
                )));
            }
        }

        let mut store = Self {
            config,
            dir,
            file,
            end_offset: file_len.max(HEADER_LEN),
            index: LogIndex::default(),
            tip: None,
            checkpoint_floor: None,
        };

        match store.load_index() {
            Ok(true) => {}
            Ok(false) => store.rebuild_index()?,
            Err(e) => {
                warn!(error = %e, "index unreadable, rebuilding from log");
                store.rebuild_index()?;
            }
        }
        store.scan_integrity()?;
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.dir
    }

    pub fn tip(&self) -> Option<(Height, BlockHash)> {
        self.tip
    }

    pub fn current_height(&self) -> Option<Height> {
        self.tip.map(|(h, _)| h)
    }

    pub fn current_hash(&self) -> BlockHash {
        self.tip.map(|(_, h)| h).unwrap_or(BlockHash::ZERO)
    }

    pub fn block_count(&self) -> usize {
        self.index.by_height.len()
    }

    /// Record the latest checkpoint height; reorgs refuse to cross it.
    pub fn set_checkpoint_floor(&mut self, height: Height) {
        self.checkpoint_floor = Some(height);
    }

    pub fn checkpoint_floor(&self) -> Option<Height> {
        self.checkpoint_floor
    }

    // ── Append ───────────────────────────────────────────────────────────────

    /// Serialize, compress and append one block; update indices and tip.
    pub fn append(&mut self, block: &Block) -> Result<(), Bt2cError> {
        let expected_height = self.tip.map(|(h, _)| h + 1).unwrap_or(0);
        if block.height != expected_height {
            return Err(Bt2cError::InvalidHeight {
                expected: expected_height,
                got: block.height,
            });
        }
        if let Some((_, tip_hash)) = self.tip {
            if block.previous_hash != tip_hash {
                return Err(Bt2cError::InvalidPreviousHash {
                    expected: tip_hash.to_hex(),
                    got: block.previous_hash.to_hex(),
                });
            }
        }

        let compressed = compress(&block.encode())?;
        let frame_start = self.end_offset;

        self.file
            .seek(SeekFrom::Start(frame_start))
            .map_err(append_err)?;
        self.file
            .write_all(&(compressed.len() as u32).to_be_bytes())
            .map_err(append_err)?;
        self.file.write_all(&compressed).map_err(append_err)?;

        let hash = block.hash();
        self.index.by_height.insert(
            block.height,
            BlockLocator {
                file: FileId::Main,
                offset: frame_start + 4,
                len: compressed.len() as u32,
            },
        );
        self.index.by_hash.insert(hash, block.height);
        self.end_offset = frame_start + 4 + compressed.len() as u64;
        self.tip = Some((block.height, hash));

        info!(height = block.height, hash = %hash, bytes = compressed.len(), "block appended");
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn get_by_height(&self, height: Height) -> Result<Option<Block>, Bt2cError> {
        match self.index.by_height.get(&height) {
            Some(loc) => Ok(Some(self.read_block(*loc)?)),
            None => Ok(None),
        }
    }

    pub fn get_by_hash(&self, hash: &BlockHash) -> Result<Option<Block>, Bt2cError> {
        match self.index.by_hash.get(hash) {
            Some(height) => self.get_by_height(*height),
            None => Ok(None),
        }
    }

    pub fn height_of(&self, hash: &BlockHash) -> Option<Height> {
        self.index.by_hash.get(hash).copied()
    }

    fn read_block(&self, loc: BlockLocator) -> Result<Block, Bt2cError> {
        let compressed = match loc.file {
            FileId::Main => {
                let mut file = self.file.try_clone().map_err(storage_err)?;
                read_at(&mut file, loc.offset, loc.len as usize)?
            }
            FileId::Archive(id) => {
                let mut file = File::open(self.archive_path(id)).map_err(storage_err)?;
                read_at(&mut file, loc.offset, loc.len as usize)?
            }
        };
        Block::decode(&decompress(&compressed)?)
    }

    fn archive_path(&self, id: u32) -> PathBuf {
        self.dir.join("archive").join(format!("blocks_{id}.dat"))
    }

    // ── Durability ───────────────────────────────────────────────────────────

    /// Flush the log and persist the index. Called on the fsync schedule and
    /// at shutdown.
    pub fn sync(&mut self) -> Result<(), Bt2cError> {
        self.file.sync_data().map_err(storage_err)?;
        self.persist_index()
    }

    fn persist_index(&self) -> Result<(), Bt2cError> {
        let bytes = bincode::serialize(&self.index)
            .map_err(|e| Bt2cError::Serialization(e.to_string()))?;
        let tmp = self.dir.join("index.dat.tmp");
        std::fs::write(&tmp, &bytes).map_err(storage_err)?;
        std::fs::rename(&tmp, self.dir.join("index.dat")).map_err(storage_err)?;
        Ok(())
    }

    /// Returns Ok(false) when no index file exists yet.
    fn load_index(&mut self) -> Result<bool, Bt2cError> {
        let path = self.dir.join("index.dat");
        if !path.exists() {
            return Ok(false);
        }
        let bytes = std::fs::read(&path).map_err(storage_err)?;
        self.index = bincode::deserialize(&bytes)
            .map_err(|e| Bt2cError::CorruptIndex(e.to_string()))?;
        self.refresh_tip()?;
        Ok(true)
    }

    fn refresh_tip(&mut self) -> Result<(), Bt2cError> {
        self.tip = match self.index.by_height.keys().next_back().copied() {
            Some(h) => {
                let block = self
                    .get_by_height(h)?
                    .ok_or_else(|| Bt2cError::CorruptIndex(format!("missing tip block {h}")))?;
                Some((h, block.hash()))
            }
            None => None,
        };
        Ok(())
    }

    /// Rebuild the index by scanning every frame in the main log.
    /// Archived frames are unreachable after a rebuild; the index file is
    /// the authority for those, which is why it is persisted on every sync.
    fn rebuild_index(&mut self) -> Result<(), Bt2cError> {
        self.index = LogIndex::default();
        let mut offset = HEADER_LEN;
        let file_len = self.file.metadata().map_err(storage_err)?.len();

        while offset + 4 <= file_len {
            let mut file = self.file.try_clone().map_err(storage_err)?;
            let len_bytes = read_at(&mut file, offset, 4)?;
            let len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
            if offset + 4 + len as u64 > file_len {
                break; // torn tail; scan_integrity truncates
            }
            let compressed = read_at(&mut file, offset + 4, len as usize)?;
            let block = Block::decode(&decompress(&compressed)?)?;
            self.index.by_height.insert(
                block.height,
                BlockLocator {
                    file: FileId::Main,
                    offset: offset + 4,
                    len,
                },
            );
            self.index.by_hash.insert(block.hash(), block.height);
            offset += 4 + len as u64;
        }
        self.end_offset = offset;
        self.refresh_tip()?;
        info!(blocks = self.index.by_height.len(), "index rebuilt from log");
        Ok(())
    }

    /// Detect a torn tail write and truncate the log to the last good frame.
    fn scan_integrity(&mut self) -> Result<(), Bt2cError> {
        let file_len = self.file.metadata().map_err(storage_err)?.len();
        let main_end = self
            .index
            .by_height
            .values()
            .filter(|l| l.file == FileId::Main)
            .map(|l| l.offset + l.len as u64)
            .max()
            .unwrap_or(HEADER_LEN);
        if file_len > main_end {
            warn!(
                expected = main_end,
                actual = file_len,
                "truncating torn tail of block log"
            );
            self.file.set_len(main_end).map_err(storage_err)?;
        }
        self.end_offset = main_end;
        Ok(())
    }

    // ── Reorganization ───────────────────────────────────────────────────────

    /// Replace the chain suffix above the fork point with `new_blocks`.
    ///
    /// `new_blocks` must be the contiguous run from `fork_height + 1` to the
    /// new tip. The walk-back is bounded by `reorg_limit` and refuses to
    /// cross the checkpoint floor; on any failure nothing is mutated.
    pub fn reorganize(&mut self, new_blocks: &[Block]) -> Result<(), Bt2cError> {
        let first = new_blocks
            .first()
            .ok_or_else(|| Bt2cError::UnknownBlock("empty reorg chain".into()))?;
        let (tip_height, _) = self
            .tip
            .ok_or_else(|| Bt2cError::UnknownBlock("reorg on empty chain".into()))?;

        // The new chain must attach to a block we already have.
        let fork_height = first
            .height
            .checked_sub(1)
            .ok_or_else(|| Bt2cError::UnknownBlock("reorg cannot replace genesis".into()))?;
        let fork_block = self
            .get_by_height(fork_height)?
            .ok_or_else(|| Bt2cError::UnknownBlock(format!("no block at fork height {fork_height}")))?;
        if fork_block.hash() != first.previous_hash {
            return Err(Bt2cError::InvalidPreviousHash {
                expected: fork_block.hash().to_hex(),
                got: first.previous_hash.to_hex(),
            });
        }

        let rewind = tip_height.saturating_sub(fork_height);
        let needed = rewind.max(new_blocks.len() as u64);
        if needed > self.config.reorg_limit {
            return Err(Bt2cError::ReorgLimitExceeded {
                limit: self.config.reorg_limit,
                needed,
            });
        }
        if let Some(floor) = self.checkpoint_floor {
            if fork_height < floor {
                return Err(Bt2cError::ReorgAcrossCheckpoint {
                    checkpoint_height: floor,
                });
            }
        }

        // Validate linkage of the whole replacement run before mutating.
        let mut prev_hash = fork_block.hash();
        let mut prev_height = fork_height;
        for block in new_blocks {
            if block.height != prev_height + 1 {
                return Err(Bt2cError::InvalidHeight {
                    expected: prev_height + 1,
                    got: block.height,
                });
            }
            if block.previous_hash != prev_hash {
                return Err(Bt2cError::InvalidPreviousHash {
                    expected: prev_hash.to_hex(),
                    got: block.previous_hash.to_hex(),
                });
            }
            prev_hash = block.hash();
            prev_height = block.height;
        }

        // Orphan everything above the fork point, then append the new run.
        self.truncate_above(fork_height)?;
        for block in new_blocks {
            self.append(block)?;
        }
        info!(
            fork_height,
            orphaned = rewind,
            applied = new_blocks.len(),
            tip = %self.current_hash(),
            "chain reorganized"
        );
        Ok(())
    }

    /// Drop all blocks above `height` from the index and physically truncate
    /// the main log (orphaned frames always occupy its tail).
    fn truncate_above(&mut self, height: Height) -> Result<(), Bt2cError> {
        let doomed: Vec<Height> = self
            .index
            .by_height
            .range(height + 1..)
            .map(|(h, _)| *h)
            .collect();

        let mut truncate_to = self.end_offset;
        for h in &doomed {
            if let Some(loc) = self.index.by_height.remove(h) {
                if loc.file == FileId::Main {
                    truncate_to = truncate_to.min(loc.offset - 4);
                }
            }
        }
        self.index.by_hash.retain(|_, h| *h <= height);
        self.file.set_len(truncate_to).map_err(storage_err)?;
        self.end_offset = truncate_to;
        self.refresh_tip()?;
        Ok(())
    }

    /// Rewind to a checkpoint height. Blocks above it are orphaned; the
    /// caller restores the embedded state snapshot separately.
    pub fn rewind_to(&mut self, height: Height, expected_hash: &BlockHash) -> Result<(), Bt2cError> {
        let block = self.get_by_height(height)?.ok_or_else(|| {
            Bt2cError::CheckpointVerificationFailed(format!("no block at height {height}"))
        })?;
        if block.hash() != *expected_hash {
            return Err(Bt2cError::CheckpointVerificationFailed(format!(
                "block at height {height} is {}, checkpoint says {}",
                block.hash(),
                expected_hash
            )));
        }
        self.truncate_above(height)
    }

    // ── Pruning / archival ───────────────────────────────────────────────────

    /// Move blocks below `tip − prune_threshold` into archive chunks and
    /// compact the main log. Archived blocks remain readable through the
    /// index. No-op unless a threshold is configured.
    pub fn prune(&mut self) -> Result<usize, Bt2cError> {
        let Some(threshold) = self.config.prune_threshold else {
            return Ok(0);
        };
        let Some((tip_height, _)) = self.tip else {
            return Ok(0);
        };
        let cutoff = tip_height.saturating_sub(threshold);

        let doomed: Vec<(Height, BlockLocator)> = self
            .index
            .by_height
            .range(..cutoff)
            .filter(|(_, loc)| loc.file == FileId::Main)
            .map(|(h, loc)| (*h, *loc))
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        // Copy frames into their archive chunks.
        for (height, loc) in &doomed {
            let mut file = self.file.try_clone().map_err(storage_err)?;
            let compressed = read_at(&mut file, loc.offset, loc.len as usize)?;

            let id = (height / self.config.blocks_per_file) as u32;
            let mut archive = OpenOptions::new()
                .create(true)
                .append(true)
                .read(true)
                .open(self.archive_path(id))
                .map_err(storage_err)?;
            let offset = archive.metadata().map_err(storage_err)?.len();
            archive
                .write_all(&(compressed.len() as u32).to_be_bytes())
                .map_err(storage_err)?;
            archive.write_all(&compressed).map_err(storage_err)?;
            archive.sync_data().map_err(storage_err)?;

            self.index.by_height.insert(
                *height,
                BlockLocator {
                    file: FileId::Archive(id),
                    offset: offset + 4,
                    len: loc.len,
                },
            );
        }

        self.compact_main()?;
        self.persist_index()?;
        info!(archived = doomed.len(), cutoff, "pruned block log");
        Ok(doomed.len())
    }

    /// Rewrite blocks.dat keeping only the frames still located in it.
    fn compact_main(&mut self) -> Result<(), Bt2cError> {
        let keep: Vec<(Height, BlockLocator)> = self
            .index
            .by_height
            .iter()
            .filter(|(_, loc)| loc.file == FileId::Main)
            .map(|(h, loc)| (*h, *loc))
            .collect();

        let tmp_path = self.dir.join("blocks.dat.tmp");
        let mut tmp = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .read(true)
            .open(&tmp_path)
            .map_err(storage_err)?;
        tmp.write_all(LOG_MAGIC).map_err(storage_err)?;
        tmp.write_all(&BLOCK_LOG_VERSION.to_be_bytes())
            .map_err(storage_err)?;

        let mut offset = HEADER_LEN;
        let mut new_locs = Vec::with_capacity(keep.len());
        for (height, loc) in keep {
            let mut file = self.file.try_clone().map_err(storage_err)?;
            let compressed = read_at(&mut file, loc.offset, loc.len as usize)?;
            tmp.write_all(&(compressed.len() as u32).to_be_bytes())
                .map_err(storage_err)?;
            tmp.write_all(&compressed).map_err(storage_err)?;
            new_locs.push((
                height,
                BlockLocator {
                    file: FileId::Main,
                    offset: offset + 4,
                    len: loc.len,
                },
            ));
            offset += 4 + loc.len as u64;
        }
        tmp.sync_data().map_err(storage_err)?;
        drop(tmp);

        std::fs::rename(&tmp_path, self.dir.join("blocks.dat")).map_err(storage_err)?;
        self.file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.dir.join("blocks.dat"))
            .map_err(storage_err)?;
        self.end_offset = offset;
        for (height, loc) in new_locs {
            self.index.by_height.insert(height, loc);
        }
        Ok(())
    }
}

// ── Frame helpers ────────────────────────────────────────────────────────────

fn compress(bytes: &[u8]) -> Result<Vec<u8>, Bt2cError> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes).map_err(storage_err)?;
    enc.finish().map_err(storage_err)
}

fn decompress(bytes: &[u8]) -> Result<Vec<u8>, Bt2cError> {
    let mut dec = GzDecoder::new(bytes);
    let mut out = Vec::new();
    dec.read_to_end(&mut out).map_err(storage_err)?;
    Ok(out)
}

fn read_at(file: &mut File, offset: u64, len: usize) -> Result<Vec<u8>, Bt2cError> {
    file.seek(SeekFrom::Start(offset)).map_err(storage_err)?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).map_err(storage_err)?;
    Ok(buf)
}

fn storage_err(e: impl std::fmt::Display) -> Bt2cError {
    Bt2cError::Storage(e.to_string())
}

fn append_err(e: impl std::fmt::Display) -> Bt2cError {
    Bt2cError::AppendFailed(e.to_string())
}

// ── Tests ────────────────────────────────────────────────────────────────────
