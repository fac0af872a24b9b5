//! Keys, signatures and addresses.
//!
//! BT2C signs with Dilithium2 detached signatures. An address is the
//! one-way image of a signing key — BLAKE3 over the raw public key bytes —
//! so holding a key pair is holding the account.

use bt2c_core::types::{Address, PublicKey, Signature};
use pqcrypto_dilithium::dilithium2;
use pqcrypto_traits::sign::{DetachedSignature, PublicKey as _, SecretKey as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid public key length: expected {expected}, got {got}")]
    InvalidPublicKeyLength { expected: usize, got: usize },
    #[error("invalid secret key length: expected {expected}, got {got}")]
    InvalidSecretKeyLength { expected: usize, got: usize },
}

/// Derive the address owned by a public key.
pub fn address_from_pubkey(pubkey_bytes: &[u8]) -> Address {
    Address::from_bytes(crate::blake3_hash(pubkey_bytes))
}

/// Sign `message` with a Dilithium2 secret key.
/// Returns a detached signature.
pub fn sign(secret_key_bytes: &[u8], message: &[u8]) -> Result<Signature, SignatureError> {
    let sk = dilithium2::SecretKey::from_bytes(secret_key_bytes).map_err(|_| {
        SignatureError::InvalidSecretKeyLength {
            expected: dilithium2::secret_key_bytes(),
            got: secret_key_bytes.len(),
        }
    })?;
    let sig = dilithium2::detached_sign(message, &sk);
    Ok(Signature(sig.as_bytes().to_vec()))
}

/// Verify a detached Dilithium2 signature.
pub fn verify_signature(
    public_key: &PublicKey,
    message: &[u8],
    signature: &Signature,
) -> Result<(), SignatureError> {
    let pk = dilithium2::PublicKey::from_bytes(&public_key.0).map_err(|_| {
        SignatureError::InvalidPublicKeyLength {
            expected: dilithium2::public_key_bytes(),
            got: public_key.0.len(),
        }
    })?;
    let sig = dilithium2::DetachedSignature::from_bytes(&signature.0)
        .map_err(|_| SignatureError::InvalidSignature)?;
    dilithium2::verify_detached_signature(&sig, message, &pk)
        .map_err(|_| SignatureError::InvalidSignature)
}

// ── KeyPair ──────────────────────────────────────────────────────────────────

/// A node's signing identity: Dilithium2 key pair plus the address derived
/// from it. Block headers, votes, wire envelopes and checkpoints are all
/// signed through this.
///
/// The secret key spends its whole lifetime in zeroizing memory; the only
/// way it leaves the process is the hex key-file form written by `keygen`.
pub struct KeyPair {
    pub address: Address,
    pub public_key: PublicKey,
    secret_key: Zeroizing<Vec<u8>>,
}

impl KeyPair {
    /// Generate a fresh identity.
    pub fn generate() -> Self {
        let (pk, sk) = dilithium2::keypair();
        Self::assemble(pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
    }

    /// Rebuild an identity from raw key bytes (a loaded key file).
    /// Rejects anything that is not a Dilithium2 key pair.
    pub fn from_raw(pk_bytes: Vec<u8>, sk_bytes: Vec<u8>) -> Result<Self, SignatureError> {
        if pk_bytes.len() != dilithium2::public_key_bytes() {
            return Err(SignatureError::InvalidPublicKeyLength {
                expected: dilithium2::public_key_bytes(),
                got: pk_bytes.len(),
            });
        }
        if sk_bytes.len() != dilithium2::secret_key_bytes() {
            return Err(SignatureError::InvalidSecretKeyLength {
                expected: dilithium2::secret_key_bytes(),
                got: sk_bytes.len(),
            });
        }
        Ok(Self::assemble(pk_bytes, sk_bytes))
    }

    fn assemble(pk_bytes: Vec<u8>, sk_bytes: Vec<u8>) -> Self {
        Self {
            address: address_from_pubkey(&pk_bytes),
            public_key: PublicKey(pk_bytes),
            secret_key: Zeroizing::new(sk_bytes),
        }
    }

    /// Sign `message` with this identity.
    pub fn sign(&self, message: &[u8]) -> Signature {
        sign(&self.secret_key, message).expect("secret key length validated at construction")
    }

    /// Read-only view of the secret key bytes.
    pub fn secret_key_bytes(&self) -> &[u8] {
        &self.secret_key
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

// ── Key file form ────────────────────────────────────────────────────────────

/// On-disk key file: both keys hex-encoded. Deserialization goes through
/// `from_raw`, so a corrupt or truncated key file is rejected on load.
#[derive(Serialize, Deserialize)]
struct KeyFile {
    public_key: String,
    secret_key: String,
}

impl Serialize for KeyPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        KeyFile {
            public_key: hex::encode(&self.public_key.0),
            secret_key: hex::encode(self.secret_key.as_slice()),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for KeyPair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;
        let file = KeyFile::deserialize(deserializer)?;
        let pk = hex::decode(&file.public_key)
            .map_err(|e| D::Error::custom(format!("bad public key hex: {e}")))?;
        let sk = hex::decode(&file.secret_key)
            .map_err(|e| D::Error::custom(format!("bad secret key hex: {e}")))?;
        KeyPair::from_raw(pk, sk).map_err(|e| D::Error::custom(format!("bad key file: {e}")))
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        let kp = KeyPair::generate();
        let message = b"fixed supply, earned trust";
        let sig = kp.sign(message);
        assert!(verify_signature(&kp.public_key, message, &sig).is_ok());
    }

    #[test]
    fn tampered_message_fails() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"original");
        assert!(verify_signature(&kp.public_key, b"tampered", &sig).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let sig = kp.sign(b"message");
        assert!(verify_signature(&other.public_key, b"message", &sig).is_err());
    }

    #[test]
    fn address_is_the_image_of_the_public_key() {
        let kp = KeyPair::generate();
        assert_eq!(kp.address, address_from_pubkey(&kp.public_key.0));
        // Distinct keys never share an address.
        assert_ne!(kp.address, KeyPair::generate().address);
    }

    #[test]
    fn from_raw_round_trips_and_validates() {
        let kp = KeyPair::generate();
        let restored =
            KeyPair::from_raw(kp.public_key.0.clone(), kp.secret_key_bytes().to_vec()).unwrap();
        assert_eq!(restored.address, kp.address);

        assert!(matches!(
            KeyPair::from_raw(vec![1, 2, 3], kp.secret_key_bytes().to_vec()),
            Err(SignatureError::InvalidPublicKeyLength { .. })
        ));
        assert!(matches!(
            KeyPair::from_raw(kp.public_key.0.clone(), vec![4, 5, 6]),
            Err(SignatureError::InvalidSecretKeyLength { .. })
        ));
    }

    #[test]
    fn key_file_round_trip() {
        let kp = KeyPair::generate();
        let json = serde_json::to_string(&kp).unwrap();
        let restored: KeyPair = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.address, kp.address);
        assert_eq!(restored.secret_key_bytes(), kp.secret_key_bytes());
    }

    #[test]
    fn truncated_key_file_rejected() {
        let json = r#"{"public_key": "abcd", "secret_key": "ef01"}"#;
        assert!(serde_json::from_str::<KeyPair>(json).is_err());
    }
}
