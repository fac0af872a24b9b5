//! Cryptographic primitives: BLAKE3 digests, Dilithium2 identities and
//! signatures, address derivation, and the seeded deterministic draw the
//! proposer election runs on.

pub mod draw;
pub mod sign;

pub use draw::{deterministic_draw, draw_in_range, election_seed};
pub use sign::{address_from_pubkey, sign, verify_signature, KeyPair, SignatureError};

/// BLAKE3 over arbitrary bytes → 32-byte digest. Every hash in the
/// protocol — transaction ids, block hashes, addresses, election seeds,
/// checkpoint digests — goes through this one function.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}
