use serde::{Deserialize, Serialize};

use crate::codec::{CanonicalEncode, Reader, Writer};
use crate::error::Bt2cError;
use crate::transaction::{decode_from_reader, encode_to_writer, Transaction};
use crate::types::{Address, BlockHash, Height, Signature, TimestampMs};

/// A BT2C block.
///
/// The proposer signs the header bytes (everything except the signature).
/// The block hash covers the header bytes AND the signature, so two blocks
/// signed by different proposers hash differently even with equal contents.
///
/// For every non-genesis block the first transaction is the coinbase reward
/// to the proposer; the genesis block carries its seed transactions only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub height: Height,
    /// Hash of the parent block; all zeros for genesis.
    pub previous_hash: BlockHash,
    /// UTC Unix timestamp in milliseconds.
    pub timestamp_ms: TimestampMs,
    /// Ordered transactions; index 0 is the coinbase for non-genesis blocks.
    pub transactions: Vec<Transaction>,
    pub proposer: Address,
    /// Proposer's detached signature over the header bytes.
    pub signature: Signature,
}

impl Block {
    pub fn new(
        height: Height,
        previous_hash: BlockHash,
        timestamp_ms: TimestampMs,
        transactions: Vec<Transaction>,
        proposer: Address,
    ) -> Self {
        Self {
            height,
            previous_hash,
            timestamp_ms,
            transactions,
            proposer,
            signature: Signature(Vec::new()),
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }

    /// The coinbase transaction, when present.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }

    /// Canonical header bytes: the proposer's signing preimage.
    /// Includes every transaction in full (their signatures too), excludes
    /// only the proposer signature.
    pub fn header_bytes(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(128 + self.transactions.len() * 256);
        w.put_u64(self.height);
        w.put_hash(self.previous_hash.as_bytes());
        w.put_i64(self.timestamp_ms);
        w.put_u32(self.transactions.len() as u32);
        for tx in &self.transactions {
            encode_to_writer(tx, &mut w);
        }
        w.put_hash(self.proposer.as_bytes());
        w.into_bytes()
    }

    /// Block hash: BLAKE3 over header bytes plus the proposer signature.
    pub fn hash(&self) -> BlockHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.header_bytes());
        hasher.update(&self.signature.0);
        BlockHash::from_bytes(*hasher.finalize().as_bytes())
    }

    /// Sum of the fees of all non-coinbase transactions.
    pub fn total_fees(&self) -> u64 {
        self.transactions
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .map(|tx| tx.fee)
            .sum()
    }
}

impl CanonicalEncode for Block {
    fn encode(&self) -> Vec<u8> {
        let mut bytes = self.header_bytes();
        let mut w = Writer::with_capacity(4 + self.signature.0.len());
        w.put_bytes(&self.signature.0);
        bytes.extend_from_slice(&w.into_bytes());
        bytes
    }

    fn decode(bytes: &[u8]) -> Result<Self, Bt2cError> {
        let mut r = Reader::new(bytes);
        let height = r.get_u64()?;
        let previous_hash = BlockHash::from_bytes(r.get_hash()?);
        let timestamp_ms = r.get_i64()?;
        let tx_count = r.get_u32()? as usize;
        let mut transactions = Vec::with_capacity(tx_count.min(1 << 16));
        for _ in 0..tx_count {
            transactions.push(decode_from_reader(&mut r)?);
        }
        let proposer = Address::from_bytes(r.get_hash()?);
        let signature = Signature(r.get_bytes()?);
        r.finish()?;
        Ok(Block {
            height,
            previous_hash,
            timestamp_ms,
            transactions,
            proposer,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TxKind;
    use crate::types::PublicKey;

    fn sample_block() -> Block {
        let coinbase = Transaction::coinbase(Address::from_bytes([5u8; 32]), 21_0000_0000, 1);
        let tx = Transaction {
            sender: Address::from_bytes([1u8; 32]),
            recipient: Address::from_bytes([2u8; 32]),
            amount: 42,
            fee: 1_000,
            nonce: 0,
            timestamp: 1,
            kind: TxKind::Transfer,
            sender_public_key: PublicKey(vec![7u8; 32]),
            signature: Signature(vec![8u8; 64]),
        };
        let mut block = Block::new(
            1,
            BlockHash::from_bytes([9u8; 32]),
            1_700_000_000_000,
            vec![coinbase, tx],
            Address::from_bytes([5u8; 32]),
        );
        block.signature = Signature(vec![0xAA; 64]);
        block
    }

    #[test]
    fn canonical_round_trip() {
        let block = sample_block();
        let decoded = Block::decode(&block.encode()).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.hash(), block.hash());
    }

    #[test]
    fn hash_includes_proposer_signature() {
        let block = sample_block();
        let mut resigned = block.clone();
        resigned.signature = Signature(vec![0xBB; 64]);
        assert_ne!(block.hash(), resigned.hash());
    }

    #[test]
    fn signing_preimage_excludes_proposer_signature() {
        let block = sample_block();
        let mut resigned = block.clone();
        resigned.signature = Signature(vec![0xBB; 64]);
        assert_eq!(block.header_bytes(), resigned.header_bytes());
    }

    #[test]
    fn coinbase_accessor_requires_zero_sender() {
        let block = sample_block();
        assert!(block.coinbase().is_some());

        let no_cb = Block::new(
            2,
            BlockHash::ZERO,
            0,
            vec![block.transactions[1].clone()],
            Address::from_bytes([5u8; 32]),
        );
        assert!(no_cb.coinbase().is_none());
    }

    #[test]
    fn total_fees_skips_coinbase() {
        assert_eq!(sample_block().total_fees(), 1_000);
    }
}
