use bt2c_consensus::votes::Vote;
use bt2c_core::codec::CanonicalEncode;
use bt2c_core::error::Bt2cError;
use bt2c_core::transaction::Transaction;
use bt2c_core::types::{Address, PublicKey, Signature};
use bt2c_core::Block;
use bt2c_crypto::{address_from_pubkey, KeyPair};
use bt2c_crypto::sign::verify_signature;
use serde::{Deserialize, Serialize};

// ── WireMessage ──────────────────────────────────────────────────────────────

/// Messages exchanged over the BT2C gossip network.
///
/// Blocks and transactions travel as their canonical consensus bytes, so
/// the wire form is exactly what gets hashed and signed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WireMessage {
    /// A transaction entering the mempool. Canonical transaction bytes.
    TxGossip { payload: Vec<u8> },

    /// The elected proposer's candidate block. Canonical block bytes.
    Proposal { payload: Vec<u8> },

    /// A prevote or precommit ballot.
    Vote { vote: Vote },

    /// A finalized block for passive peers and catch-up.
    BlockCommit { payload: Vec<u8> },
}

impl WireMessage {
    pub fn tx(tx: &Transaction) -> Self {
        WireMessage::TxGossip {
            payload: tx.encode(),
        }
    }

    pub fn proposal(block: &Block) -> Self {
        WireMessage::Proposal {
            payload: block.encode(),
        }
    }

    pub fn commit(block: &Block) -> Self {
        WireMessage::BlockCommit {
            payload: block.encode(),
        }
    }

    pub fn decode_tx(payload: &[u8]) -> Result<Transaction, Bt2cError> {
        Transaction::decode(payload)
    }

    pub fn decode_block(payload: &[u8]) -> Result<Block, Bt2cError> {
        Block::decode(payload)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("wire message serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Bt2cError> {
        bincode::deserialize(bytes).map_err(|e| Bt2cError::Serialization(e.to_string()))
    }
}

// ── SignedEnvelope ───────────────────────────────────────────────────────────

/// Every wire message travels in an envelope signed by the sending
/// validator: the sender address, its public key, and a detached signature
/// over the message bytes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub sender: Address,
    pub public_key: PublicKey,
    pub payload: Vec<u8>,
    pub signature: Signature,
}

impl SignedEnvelope {
    /// Wrap and sign a message with the node's key.
    pub fn seal(keypair: &KeyPair, message: &WireMessage) -> Self {
        let payload = message.to_bytes();
        let signature = keypair.sign(&payload);
        Self {
            sender: keypair.address,
            public_key: keypair.public_key.clone(),
            payload,
            signature,
        }
    }

    /// Verify sender identity and signature, then decode the message.
    pub fn open(&self) -> Result<WireMessage, Bt2cError> {
        if address_from_pubkey(&self.public_key.0) != self.sender {
            return Err(Bt2cError::AddressKeyMismatch);
        }
        verify_signature(&self.public_key, &self.payload, &self.signature)
            .map_err(|_| Bt2cError::InvalidSignature)?;
        WireMessage::from_bytes(&self.payload)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("envelope serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Bt2cError> {
        bincode::deserialize(bytes).map_err(|e| Bt2cError::Serialization(e.to_string()))
    }
}
