use serde::{Deserialize, Serialize};

use crate::codec::{CanonicalEncode, Reader, Writer};
use crate::error::Bt2cError;
use crate::types::{Address, Amount, Nonce, PublicKey, Signature, Timestamp, TxHash};

// ── TxKind ───────────────────────────────────────────────────────────────────

/// Every value movement on the BT2C ledger is one of these.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TxKind {
    /// Plain value transfer between two accounts.
    Transfer,
    /// Coinbase reward (sender is the zero address; no signature, no nonce).
    Reward,
    /// Move balance into validator stake.
    Stake,
    /// Move validator stake back into spendable balance.
    Unstake,
}

impl TxKind {
    fn tag(self) -> u8 {
        match self {
            TxKind::Transfer => 0,
            TxKind::Reward => 1,
            TxKind::Stake => 2,
            TxKind::Unstake => 3,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, Bt2cError> {
        Ok(match tag {
            0 => TxKind::Transfer,
            1 => TxKind::Reward,
            2 => TxKind::Stake,
            3 => TxKind::Unstake,
            other => {
                return Err(Bt2cError::Serialization(format!(
                    "unknown transaction kind tag {other}"
                )))
            }
        })
    }
}

// ── Transaction ──────────────────────────────────────────────────────────────

/// A fully-formed, signed BT2C transaction.
///
/// The transaction hash is BLAKE3 of the canonical body bytes — every field
/// in fixed order, big-endian — with the signature EXCLUDED. The same body
/// bytes are the signing preimage. The sender public key travels with the
/// transaction so validation needs no external key registry; the sender
/// address must equal BLAKE3(public key).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub sender: Address,
    pub recipient: Address,
    /// Satoshis transferred.
    pub amount: Amount,
    /// Satoshis paid to the block proposer.
    pub fee: Amount,
    /// Per-sender sequence number, starting at 0.
    pub nonce: Nonce,
    /// UTC Unix timestamp (seconds) when the transaction was created.
    pub timestamp: Timestamp,
    pub kind: TxKind,
    /// Sender's Dilithium2 public key. Empty for coinbase.
    pub sender_public_key: PublicKey,
    /// Detached signature over the body bytes. Empty for coinbase.
    pub signature: Signature,
}

impl Transaction {
    /// Build an unsigned transfer; the caller signs the body bytes and sets
    /// `signature` afterwards.
    pub fn unsigned(
        sender: Address,
        recipient: Address,
        amount: Amount,
        fee: Amount,
        nonce: Nonce,
        timestamp: Timestamp,
        kind: TxKind,
        sender_public_key: PublicKey,
    ) -> Self {
        Self {
            sender,
            recipient,
            amount,
            fee,
            nonce,
            timestamp,
            kind,
            sender_public_key,
            signature: Signature(Vec::new()),
        }
    }

    /// Coinbase reward transaction: zero sender, no signature, no nonce.
    pub fn coinbase(recipient: Address, amount: Amount, timestamp: Timestamp) -> Self {
        Self {
            sender: Address::ZERO,
            recipient,
            amount,
            fee: 0,
            nonce: 0,
            timestamp,
            kind: TxKind::Reward,
            sender_public_key: PublicKey(Vec::new()),
            signature: Signature(Vec::new()),
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.sender.is_zero()
    }

    /// Canonical body bytes: the signing preimage and hash input.
    /// Signature excluded.
    pub fn body_bytes(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(128 + self.sender_public_key.0.len());
        w.put_hash(self.sender.as_bytes());
        w.put_hash(self.recipient.as_bytes());
        w.put_u64(self.amount);
        w.put_u64(self.fee);
        w.put_u64(self.nonce);
        w.put_i64(self.timestamp);
        w.put_u8(self.kind.tag());
        w.put_bytes(&self.sender_public_key.0);
        w.into_bytes()
    }

    pub fn hash(&self) -> TxHash {
        TxHash::from_bytes(*blake3::hash(&self.body_bytes()).as_bytes())
    }

    /// Size of the full canonical encoding — the unit for fee-rate math.
    pub fn encoded_len(&self) -> usize {
        self.body_bytes().len() + 4 + self.signature.0.len()
    }

    /// Fee rate in milli-satoshis per byte. Milli precision keeps the RBF
    /// multiplier comparison exact in integer arithmetic.
    pub fn fee_rate_millisat(&self) -> u64 {
        let len = self.encoded_len() as u64;
        if len == 0 {
            return 0;
        }
        self.fee.saturating_mul(1_000) / len
    }
}

impl CanonicalEncode for Transaction {
    fn encode(&self) -> Vec<u8> {
        let mut bytes = self.body_bytes();
        let mut w = Writer::with_capacity(4 + self.signature.0.len());
        w.put_bytes(&self.signature.0);
        bytes.extend_from_slice(&w.into_bytes());
        bytes
    }

    fn decode(bytes: &[u8]) -> Result<Self, Bt2cError> {
        let mut r = Reader::new(bytes);
        let tx = decode_from_reader(&mut r)?;
        r.finish()?;
        Ok(tx)
    }
}

/// Decode a transaction mid-stream (blocks embed transactions back to back).
pub(crate) fn decode_from_reader(r: &mut Reader<'_>) -> Result<Transaction, Bt2cError> {
    let sender = Address::from_bytes(r.get_hash()?);
    let recipient = Address::from_bytes(r.get_hash()?);
    let amount = r.get_u64()?;
    let fee = r.get_u64()?;
    let nonce = r.get_u64()?;
    let timestamp = r.get_i64()?;
    let kind = TxKind::from_tag(r.get_u8()?)?;
    let sender_public_key = PublicKey(r.get_bytes()?);
    let signature = Signature(r.get_bytes()?);
    Ok(Transaction {
        sender,
        recipient,
        amount,
        fee,
        nonce,
        timestamp,
        kind,
        sender_public_key,
        signature,
    })
}

/// Encode a transaction mid-stream.
pub(crate) fn encode_to_writer(tx: &Transaction, w: &mut Writer) {
    w.put_hash(tx.sender.as_bytes());
    w.put_hash(tx.recipient.as_bytes());
    w.put_u64(tx.amount);
    w.put_u64(tx.fee);
    w.put_u64(tx.nonce);
    w.put_i64(tx.timestamp);
    w.put_u8(tx.kind.tag());
    w.put_bytes(&tx.sender_public_key.0);
    w.put_bytes(&tx.signature.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction {
            sender: Address::from_bytes([1u8; 32]),
            recipient: Address::from_bytes([2u8; 32]),
            amount: 5_0000_0000,
            fee: 1_000,
            nonce: 3,
            timestamp: 1_700_000_000,
            kind: TxKind::Transfer,
            sender_public_key: PublicKey(vec![7u8; 64]),
            signature: Signature(vec![9u8; 80]),
        }
    }

    #[test]
    fn canonical_round_trip() {
        let tx = sample_tx();
        let decoded = Transaction::decode(&tx.encode()).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn hash_excludes_signature() {
        let tx = sample_tx();
        let mut resigned = tx.clone();
        resigned.signature = Signature(vec![0xFF; 80]);
        assert_eq!(tx.hash(), resigned.hash());
    }

    #[test]
    fn hash_covers_every_body_field() {
        let tx = sample_tx();
        let mut other = tx.clone();
        other.amount += 1;
        assert_ne!(tx.hash(), other.hash());

        let mut other = tx.clone();
        other.nonce += 1;
        assert_ne!(tx.hash(), other.hash());
    }

    #[test]
    fn hash_is_stable_under_reencoding() {
        let tx = sample_tx();
        let decoded = Transaction::decode(&tx.encode()).unwrap();
        assert_eq!(tx.hash(), decoded.hash());
    }

    #[test]
    fn coinbase_has_zero_sender_and_no_signature() {
        let cb = Transaction::coinbase(Address::from_bytes([3u8; 32]), 21_0000_0000, 0);
        assert!(cb.is_coinbase());
        assert!(cb.signature.0.is_empty());
        assert_eq!(cb.kind, TxKind::Reward);
        assert_eq!(cb.fee, 0);
    }

    #[test]
    fn unknown_kind_tag_rejected() {
        let mut bytes = sample_tx().encode();
        // The kind tag sits after two hashes and four integers.
        let tag_offset = 32 + 32 + 8 + 8 + 8 + 8;
        bytes[tag_offset] = 99;
        assert!(Transaction::decode(&bytes).is_err());
    }
}
