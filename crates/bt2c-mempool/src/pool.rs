use std::collections::{BTreeMap, HashMap, HashSet};

use bt2c_core::error::Bt2cError;
use bt2c_core::transaction::Transaction;
use bt2c_core::types::{Address, Nonce, Timestamp, TxHash};
use bt2c_core::Block;
use tracing::{debug, info, warn};

use crate::config::MempoolConfig;
use crate::entry::{AdmitOutcome, MempoolEntry, MempoolStats};

/// The transaction pool.
///
/// Admission is serialized with eviction by ownership: all mutation goes
/// through `&mut self` on a single owner. Per sender the pool keeps nonces
/// in a BTreeMap, so the nonce-sequence invariant (no silent gaps; evicting
/// a nonce evicts its descendants) is enforced structurally.
pub struct Mempool {
    config: MempoolConfig,
    entries: HashMap<TxHash, MempoolEntry>,
    by_sender: HashMap<Address, BTreeMap<Nonce, TxHash>>,
    /// Hashes of transactions already committed — replay protection.
    spent: HashSet<TxHash>,
    size_bytes: usize,
}

impl Mempool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            by_sender: HashMap::new(),
            spent: HashSet::new(),
            size_bytes: 0,
        }
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    // ── Admission ────────────────────────────────────────────────────────────

    /// Admit `tx`, given the sender's next expected nonce in committed state.
    ///
    /// Rejections: duplicate, expired, stale nonce, underpriced replacement,
    /// replayed hash, network-minimum fee, congestion fee floor. A nonce
    /// strictly ahead of the expected sequence is admitted but flagged
    /// suspicious, as are dust and anomalously high fees.
    pub fn admit(
        &mut self,
        tx: Transaction,
        state_nonce: Nonce,
        now: Timestamp,
    ) -> Result<AdmitOutcome, Bt2cError> {
        let hash = tx.hash();

        // 1. Duplicate.
        if self.entries.contains_key(&hash) {
            return Err(Bt2cError::DuplicateTransaction(hash.to_hex()));
        }

        // 2. Expired.
        if now - tx.timestamp > self.config.tx_max_age_s {
            return Err(Bt2cError::TransactionExpired);
        }

        // Network minimum fee.
        if tx.fee < self.config.min_fee {
            return Err(Bt2cError::FeeBelowMinimum {
                min: self.config.min_fee,
                got: tx.fee,
            });
        }

        // 3. Nonce placement: stale, replacement, in-sequence, or gap.
        if tx.nonce < state_nonce {
            return Err(Bt2cError::InvalidNonce {
                expected: state_nonce,
                got: tx.nonce,
            });
        }
        let sender_nonces = self.by_sender.get(&tx.sender);
        let expected = sender_nonces
            .and_then(|m| m.keys().next_back().copied())
            .map(|max| max + 1)
            .unwrap_or(state_nonce)
            .max(state_nonce);

        let replaced = match sender_nonces.and_then(|m| m.get(&tx.nonce)).copied() {
            Some(old_hash) => {
                // Replace-by-fee: the newcomer must beat the incumbent's
                // fee rate by the configured multiplier.
                let old = &self.entries[&old_hash];
                let required =
                    old.fee_rate_millisat.saturating_mul(self.config.rbf_multiplier_bp) / 10_000;
                let got = tx.fee_rate_millisat();
                if got < required {
                    return Err(Bt2cError::ReplacementFeeTooLow { required, got });
                }
                Some(old_hash)
            }
            None => None,
        };

        // 4. Replay.
        if self.spent.contains(&hash) {
            return Err(Bt2cError::DoubleSpend(hash.to_hex()));
        }

        // 5. Congestion fee floor.
        if self.size_bytes > self.config.congestion_bytes() {
            let floor_millisat = self.config.congestion_min_fee_rate * 1_000;
            if tx.fee_rate_millisat() < floor_millisat {
                return Err(Bt2cError::FeeBelowMinimum {
                    min: self.config.congestion_min_fee_rate,
                    got: tx.fee_rate_millisat() / 1_000,
                });
            }
        }

        // 6. Suspicion heuristics: anomalous fee, dust rate, nonce gap.
        let nonce_gap = replaced.is_none() && tx.nonce > expected;
        let high_fee = tx.fee > self.config.high_fee_threshold;
        let dust = tx.fee_rate_millisat() < self.config.dust_fee_rate * 1_000;
        let suspicious = nonce_gap || high_fee || dust;
        if suspicious {
            warn!(
                tx = %hash,
                nonce_gap,
                high_fee,
                dust,
                "admitting suspicious transaction"
            );
        }

        // 7. Insert, then shed load if over capacity.
        if let Some(old_hash) = replaced {
            self.remove_entry(&old_hash);
        }
        let entry = MempoolEntry::new(tx, now, suspicious);
        self.size_bytes += entry.size_bytes;
        self.by_sender
            .entry(entry.tx.sender)
            .or_default()
            .insert(entry.tx.nonce, hash);
        debug!(tx = %hash, sender = %entry.tx.sender, nonce = entry.tx.nonce, "admitted");
        self.entries.insert(hash, entry);

        if self.size_bytes > self.config.max_bytes {
            self.evict_to_target(now);
            if !self.entries.contains_key(&hash) {
                // The newcomer itself was the lowest-priority entry.
                return Err(Bt2cError::MempoolFull);
            }
        }

        Ok(AdmitOutcome {
            hash,
            replaced,
            suspicious,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn get(&self, hash: &TxHash) -> Option<&MempoolEntry> {
        self.entries.get(hash)
    }

    pub fn contains(&self, hash: &TxHash) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Entries for one sender, in nonce order.
    pub fn by_sender(&self, sender: &Address) -> Vec<&MempoolEntry> {
        self.by_sender
            .get(sender)
            .map(|m| m.values().filter_map(|h| self.entries.get(h)).collect())
            .unwrap_or_default()
    }

    /// All entries ordered by descending priority.
    pub fn iterate_by_priority(&self, now: Timestamp) -> Vec<&MempoolEntry> {
        let mut list: Vec<&MempoolEntry> = self.entries.values().collect();
        list.sort_by(|a, b| {
            self.priority(b, now)
                .partial_cmp(&self.priority(a, now))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        list
    }

    pub fn stats(&self, now: Timestamp) -> MempoolStats {
        MempoolStats {
            count: self.entries.len(),
            size_bytes: self.size_bytes,
            suspicious_count: self.entries.values().filter(|e| e.suspicious).count(),
            oldest_age_secs: self
                .entries
                .values()
                .map(|e| e.age_secs(now))
                .max()
                .unwrap_or(0),
        }
    }

    /// `priority = α·fee_rate − β·age + γ·ancestor_count`, halved when
    /// suspicious. Node-local policy, so f64 is fine here.
    fn priority(&self, entry: &MempoolEntry, now: Timestamp) -> f64 {
        let ancestors = self
            .by_sender
            .get(&entry.tx.sender)
            .map(|m| m.range(..entry.tx.nonce).count())
            .unwrap_or(0);
        let fee_rate = entry.fee_rate_millisat as f64 / 1_000.0;
        let mut p = self.config.alpha * fee_rate - self.config.beta * entry.age_secs(now) as f64
            + self.config.gamma * ancestors as f64;
        if entry.suspicious {
            p *= self.config.suspicious_multiplier;
        }
        p
    }

    // ── Block assembly ───────────────────────────────────────────────────────

    /// Drain up to `max_txs`/`max_bytes` of transactions in priority order,
    /// keeping every sender's nonce sequence dense from its committed nonce.
    /// Does not mutate the pool; commit-time removal happens in
    /// `on_block_committed`.
    pub fn select_for_block<F>(
        &self,
        max_txs: usize,
        max_bytes: usize,
        state_nonce: F,
        now: Timestamp,
    ) -> Vec<Transaction>
    where
        F: Fn(&Address) -> Nonce,
    {
        let ranked = self.iterate_by_priority(now);
        let mut needed: HashMap<Address, Nonce> = HashMap::new();
        let mut taken: Vec<&MempoolEntry> = Vec::new();
        let mut taken_set: HashSet<TxHash> = HashSet::new();
        let mut bytes = 0usize;

        // Multiple passes: taking a low-nonce transaction can unblock a
        // higher-priority descendant skipped in an earlier pass.
        loop {
            let mut progressed = false;
            for entry in &ranked {
                if taken.len() >= max_txs || bytes >= max_bytes {
                    break;
                }
                if taken_set.contains(&entry.hash) {
                    continue;
                }
                if bytes + entry.size_bytes > max_bytes {
                    continue;
                }
                let next = needed
                    .entry(entry.tx.sender)
                    .or_insert_with(|| state_nonce(&entry.tx.sender));
                if entry.tx.nonce != *next {
                    continue;
                }
                *next += 1;
                bytes += entry.size_bytes;
                taken_set.insert(entry.hash);
                taken.push(entry);
                progressed = true;
            }
            if !progressed || taken.len() >= max_txs || bytes >= max_bytes {
                break;
            }
        }

        // Block order must satisfy strict per-sender nonce ordering.
        taken.sort_by_key(|e| (e.tx.sender, e.tx.nonce));
        taken.into_iter().map(|e| e.tx.clone()).collect()
    }

    // ── Eviction ─────────────────────────────────────────────────────────────

    /// Background sweep: drop expired entries, then shed load down to the
    /// target size if the pool is over capacity.
    pub fn sweep(&mut self, now: Timestamp) -> Vec<TxHash> {
        let mut removed = Vec::new();

        let expired: Vec<TxHash> = self
            .entries
            .values()
            .filter(|e| {
                let ttl = if e.suspicious {
                    self.config.suspicious_tx_max_age_s
                } else {
                    self.config.tx_max_age_s
                };
                e.age_secs(now) > ttl
            })
            .map(|e| e.hash)
            .collect();
        for hash in expired {
            removed.extend(self.remove_with_descendants(&hash));
        }

        if self.size_bytes > self.config.max_bytes {
            removed.extend(self.evict_to_target(now));
        }
        if !removed.is_empty() {
            info!(evicted = removed.len(), size = self.size_bytes, "mempool sweep");
        }
        removed
    }

    /// Evict lowest-priority entries until the pool is at its target size.
    /// Brand-new entries are spared; the per-sender descendant rule always
    /// holds.
    fn evict_to_target(&mut self, now: Timestamp) -> Vec<TxHash> {
        let mut removed = Vec::new();
        while self.size_bytes > self.config.target_bytes() {
            let victim = self
                .entries
                .values()
                .filter(|e| e.age_secs(now) >= self.config.min_age_for_eviction_s)
                .min_by(|a, b| {
                    self.priority(a, now)
                        .partial_cmp(&self.priority(b, now))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|e| e.hash);
            match victim {
                Some(hash) => removed.extend(self.remove_with_descendants(&hash)),
                None => break,
            }
        }
        removed
    }

    /// Remove an entry together with every higher-nonce entry from the same
    /// sender: a hole in the sequence would strand them anyway.
    pub fn remove_with_descendants(&mut self, hash: &TxHash) -> Vec<TxHash> {
        let Some(entry) = self.entries.get(hash) else {
            return Vec::new();
        };
        let sender = entry.tx.sender;
        let nonce = entry.tx.nonce;

        let doomed: Vec<TxHash> = self
            .by_sender
            .get(&sender)
            .map(|m| m.range(nonce..).map(|(_, h)| *h).collect())
            .unwrap_or_default();
        for h in &doomed {
            self.remove_entry(h);
        }
        doomed
    }

    fn remove_entry(&mut self, hash: &TxHash) {
        if let Some(entry) = self.entries.remove(hash) {
            self.size_bytes -= entry.size_bytes;
            if let Some(m) = self.by_sender.get_mut(&entry.tx.sender) {
                m.remove(&entry.tx.nonce);
                if m.is_empty() {
                    self.by_sender.remove(&entry.tx.sender);
                }
            }
        }
    }

    // ── Post-commit ──────────────────────────────────────────────────────────

    /// Reconcile with a committed block: drop included transactions, mark
    /// their hashes spent, and drop now-stale same-sender entries. Surviving
    /// descendants stay admissible because the sequence simply advances.
    pub fn on_block_committed(&mut self, block: &Block) {
        for tx in &block.transactions {
            if tx.is_coinbase() {
                continue;
            }
            let hash = tx.hash();
            self.spent.insert(hash);
            self.remove_entry(&hash);

            // Competing entries at or below the committed nonce are stale.
            let stale: Vec<TxHash> = self
                .by_sender
                .get(&tx.sender)
                .map(|m| m.range(..=tx.nonce).map(|(_, h)| *h).collect())
                .unwrap_or_default();
            for h in stale {
                self.remove_entry(&h);
            }
        }
        debug!(
            height = block.height,
            remaining = self.entries.len(),
            "mempool reconciled with committed block"
        );
    }

    /// Whether a hash has already been committed (replay protection).
    pub fn is_spent(&self, hash: &TxHash) -> bool {
        self.spent.contains(hash)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bt2c_core::transaction::TxKind;
    use bt2c_core::types::{Amount, BlockHash, PublicKey, Signature};

    const NOW: Timestamp = 1_000_000;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    /// The pool never checks signatures (the state machine does), so test
    /// transactions carry fixed-size placeholder keys and signatures.
    fn tx(sender: u8, nonce: Nonce, fee: Amount) -> Transaction {
        let mut t = Transaction::unsigned(
            addr(sender),
            addr(200),
            1_000,
            fee,
            nonce,
            NOW,
            TxKind::Transfer,
            PublicKey(vec![sender; 32]),
        );
        t.signature = Signature(vec![1u8; 64]);
        t
    }

    fn pool() -> Mempool {
        Mempool::new(MempoolConfig::default())
    }

    // ── Admission ────────────────────────────────────────────────────────────

    #[test]
    fn admit_in_sequence() {
        let mut p = pool();
        let out = p.admit(tx(1, 0, 2_000), 0, NOW).unwrap();
        assert!(!out.suspicious);
        assert!(out.replaced.is_none());
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn duplicate_rejected() {
        let mut p = pool();
        let t = tx(1, 0, 2_000);
        p.admit(t.clone(), 0, NOW).unwrap();
        assert!(matches!(
            p.admit(t, 0, NOW).unwrap_err(),
            Bt2cError::DuplicateTransaction(_)
        ));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn expired_rejected() {
        let mut p = pool();
        let late = NOW + MempoolConfig::default().tx_max_age_s + 1;
        assert!(matches!(
            p.admit(tx(1, 0, 2_000), 0, late).unwrap_err(),
            Bt2cError::TransactionExpired
        ));
    }

    #[test]
    fn stale_nonce_rejected() {
        let mut p = pool();
        assert!(matches!(
            p.admit(tx(1, 2, 2_000), 3, NOW).unwrap_err(),
            Bt2cError::InvalidNonce { expected: 3, got: 2 }
        ));
    }

    #[test]
    fn fee_below_network_minimum_rejected() {
        let mut p = pool();
        assert!(matches!(
            p.admit(tx(1, 0, 10), 0, NOW).unwrap_err(),
            Bt2cError::FeeBelowMinimum { .. }
        ));
    }

    #[test]
    fn replayed_hash_rejected() {
        let mut p = pool();
        let t = tx(1, 0, 2_000);
        p.spent.insert(t.hash());
        assert!(matches!(
            p.admit(t, 0, NOW).unwrap_err(),
            Bt2cError::DoubleSpend(_)
        ));
    }

    // ── Replace-by-fee ───────────────────────────────────────────────────────

    #[test]
    fn rbf_accepts_sufficient_bump() {
        let mut p = pool();
        let t_a = tx(1, 0, 100_000);
        let t_b = tx(1, 0, 200_000); // 2× the fee rate ≥ 1.25×
        let a_hash = t_a.hash();
        p.admit(t_a, 0, NOW).unwrap();

        let out = p.admit(t_b.clone(), 0, NOW).unwrap();
        assert_eq!(out.replaced, Some(a_hash));
        assert!(!p.contains(&a_hash));
        assert!(p.contains(&t_b.hash()));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn rbf_rejects_insufficient_bump() {
        let mut p = pool();
        let t_a = tx(1, 0, 100_000);
        let t_c = tx(1, 0, 110_000); // 1.1× < 1.25×
        let a_hash = t_a.hash();
        p.admit(t_a, 0, NOW).unwrap();

        assert!(matches!(
            p.admit(t_c, 0, NOW).unwrap_err(),
            Bt2cError::ReplacementFeeTooLow { .. }
        ));
        assert!(p.contains(&a_hash));
        assert_eq!(p.len(), 1);
    }

    // ── Suspicion heuristics ─────────────────────────────────────────────────

    #[test]
    fn nonce_gap_admitted_but_flagged() {
        let mut p = pool();
        let out = p.admit(tx(1, 5, 2_000), 0, NOW).unwrap();
        assert!(out.suspicious);
        assert_eq!(p.stats(NOW).suspicious_count, 1);
    }

    #[test]
    fn anomalously_high_fee_flagged() {
        let mut p = pool();
        let out = p
            .admit(tx(1, 0, MempoolConfig::default().high_fee_threshold + 1), 0, NOW)
            .unwrap();
        assert!(out.suspicious);
    }

    #[test]
    fn gap_filling_clears_the_sequence() {
        let mut p = pool();
        p.admit(tx(1, 2, 2_000), 0, NOW).unwrap(); // gap, flagged
        let out = p.admit(tx(1, 0, 2_000), 0, NOW).unwrap();
        assert!(!out.suspicious);
        let out = p.admit(tx(1, 1, 2_000), 0, NOW).unwrap();
        assert!(!out.suspicious);
        assert_eq!(p.by_sender(&addr(1)).len(), 3);
    }

    // ── Eviction ─────────────────────────────────────────────────────────────

    #[test]
    fn descendant_eviction_rule() {
        let mut p = pool();
        for n in 0..4 {
            p.admit(tx(1, n, 2_000), 0, NOW).unwrap();
        }
        let middle = tx(1, 1, 2_000).hash();
        let removed = p.remove_with_descendants(&middle);
        // Evicting nonce 1 takes 1, 2 and 3 with it; nonce 0 survives.
        assert_eq!(removed.len(), 3);
        assert_eq!(p.by_sender(&addr(1)).len(), 1);
        assert_eq!(p.by_sender(&addr(1))[0].tx.nonce, 0);
    }

    #[test]
    fn sweep_drops_expired_entries() {
        let mut p = pool();
        p.admit(tx(1, 0, 2_000), 0, NOW).unwrap();
        let later = NOW + MempoolConfig::default().tx_max_age_s + 1;
        let removed = p.sweep(later);
        assert_eq!(removed.len(), 1);
        assert!(p.is_empty());
    }

    #[test]
    fn suspicious_entries_expire_sooner() {
        let mut p = pool();
        p.admit(tx(1, 3, 2_000), 0, NOW).unwrap(); // flagged: nonce gap
        p.admit(tx(2, 0, 2_000), 0, NOW).unwrap();
        let later = NOW + MempoolConfig::default().suspicious_tx_max_age_s + 1;
        p.sweep(later);
        assert_eq!(p.len(), 1);
        assert!(p.by_sender(&addr(1)).is_empty());
    }

    #[test]
    fn capacity_eviction_prefers_low_priority() {
        let mut cfg = MempoolConfig::default();
        // Three ~200-byte transactions overflow a 500-byte pool.
        cfg.max_bytes = 500;
        cfg.min_age_for_eviction_s = 0;
        let mut p = Mempool::new(cfg);

        p.admit(tx(1, 0, 2_000), 0, NOW).unwrap();
        p.admit(tx(2, 0, 500_000), 0, NOW).unwrap();
        let _ = p.admit(tx(3, 0, 400_000), 0, NOW);

        assert!(p.by_sender(&addr(1)).is_empty());
        assert!(!p.by_sender(&addr(2)).is_empty());
    }

    // ── Block assembly ───────────────────────────────────────────────────────

    #[test]
    fn selection_respects_nonce_order_within_sender() {
        let mut p = pool();
        p.admit(tx(1, 0, 2_000), 0, NOW).unwrap();
        p.admit(tx(1, 1, 900_000), 0, NOW).unwrap(); // higher priority than nonce 0
        p.admit(tx(2, 0, 50_000), 0, NOW).unwrap();

        let selected = p.select_for_block(10, 1 << 20, |_| 0, NOW);
        assert_eq!(selected.len(), 3);
        let sender1: Vec<Nonce> = selected
            .iter()
            .filter(|t| t.sender == addr(1))
            .map(|t| t.nonce)
            .collect();
        assert_eq!(sender1, vec![0, 1]);
    }

    #[test]
    fn selection_honours_caps() {
        let mut p = pool();
        for s in 1..=5u8 {
            p.admit(tx(s, 0, 2_000), 0, NOW).unwrap();
        }
        assert_eq!(p.select_for_block(2, 1 << 20, |_| 0, NOW).len(), 2);
    }

    // ── Post-commit ──────────────────────────────────────────────────────────

    #[test]
    fn committed_txs_are_removed_and_marked_spent() {
        let mut p = pool();
        let t0 = tx(1, 0, 2_000);
        let t1 = tx(1, 1, 2_000);
        p.admit(t0.clone(), 0, NOW).unwrap();
        p.admit(t1.clone(), 0, NOW).unwrap();

        let block = Block::new(1, BlockHash::ZERO, 0, vec![t0.clone()], addr(9));
        p.on_block_committed(&block);

        assert!(!p.contains(&t0.hash()));
        assert!(p.is_spent(&t0.hash()));
        // The descendant survives and is now first in line.
        assert!(p.contains(&t1.hash()));
        // A replay of t0 is rejected by the spent set.
        assert!(matches!(
            p.admit(t0, 1, NOW).unwrap_err(),
            Bt2cError::DoubleSpend(_)
        ));
    }

    #[test]
    fn competing_stale_entries_are_dropped_on_commit() {
        let mut p = pool();
        let ours = tx(1, 0, 2_000);
        p.admit(ours.clone(), 0, NOW).unwrap();

        // A different transaction with the same nonce is committed.
        let theirs = tx(1, 0, 999_000);
        let block = Block::new(1, BlockHash::ZERO, 0, vec![theirs], addr(9));
        p.on_block_committed(&block);

        assert!(!p.contains(&ours.hash()));
    }
}
