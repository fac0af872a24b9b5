use bt2c_core::transaction::Transaction;
use bt2c_core::types::{Timestamp, TxHash};
use serde::{Deserialize, Serialize};

/// One resident transaction plus the bookkeeping admission computed for it.
#[derive(Clone, Debug)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub hash: TxHash,
    /// Wall-clock arrival (seconds). Node-local; never consensus-visible.
    pub received_at: Timestamp,
    /// Full canonical encoding size — the unit for fee-rate math.
    pub size_bytes: usize,
    /// Fee rate in milli-satoshis per byte.
    pub fee_rate_millisat: u64,
    /// Flagged by the admission heuristics; admitted but evicted sooner.
    pub suspicious: bool,
}

impl MempoolEntry {
    pub fn new(tx: Transaction, received_at: Timestamp, suspicious: bool) -> Self {
        let hash = tx.hash();
        let size_bytes = tx.encoded_len();
        let fee_rate_millisat = tx.fee_rate_millisat();
        Self {
            tx,
            hash,
            received_at,
            size_bytes,
            fee_rate_millisat,
            suspicious,
        }
    }

    pub fn age_secs(&self, now: Timestamp) -> i64 {
        (now - self.received_at).max(0)
    }
}

/// Snapshot of pool health for operators and peers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MempoolStats {
    pub count: usize,
    pub size_bytes: usize,
    pub suspicious_count: usize,
    pub oldest_age_secs: i64,
}

/// What admission did with a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdmitOutcome {
    pub hash: TxHash,
    /// Hash of the same-nonce entry displaced via replace-by-fee, if any.
    pub replaced: Option<TxHash>,
    pub suspicious: bool,
}
