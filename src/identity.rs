//! Peer identity records, identifier formats, and challenge signatures.
//!
//! Identities are produced by an external identity service (hardware
//! fingerprinting lives there) and consumed here as opaque, immutable records.
//!
//! # Signature scheme
//!
//! - Ed25519 via `ring`
//! - Public keys: 32 bytes, hex-encoded
//! - Signatures: 64 bytes, hex-encoded, over the UTF-8 bytes of the message
//!
//! # Identifier formats
//!
//! | Kind | Format |
//! |---|---|
//! | user | `<prefix>_<hex>` |
//! | session | `sess_<32 hex>` |
//! | challenge | `chal_<16 hex>` |
//! | registration block | `reg_<32 hex>` |

use rand::RngCore;
use ring::rand::SystemRandom;
use ring::signature::{self, Ed25519KeyPair, KeyPair, UnparsedPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Per-device identity, created once by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    /// Hex-encoded Ed25519 public key
    pub public_key: String,
    pub hardware_fingerprint_hash: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_type: Option<String>,
}

/// Identity and signature errors.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Key generation failed")]
    KeyGeneration,

    #[error("Invalid key material: {0}")]
    InvalidKey(String),
}

/// Random identifier of the form `<prefix>_<hex>` with `bytes` of entropy.
pub fn generate_id(prefix: &str, bytes: usize) -> String {
    format!("{}_{}", prefix, random_hex(bytes))
}

/// Hex string of `bytes` random bytes.
pub fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

pub fn session_id() -> String {
    generate_id("sess", 16)
}

pub fn challenge_id() -> String {
    generate_id("chal", 8)
}

pub fn registration_block_id() -> String {
    generate_id("reg", 16)
}

/// Check that `id` has the `<prefix>_<hex>` shape.
pub fn is_valid_user_id(id: &str) -> bool {
    match id.split_once('_') {
        Some((prefix, tail)) => {
            !prefix.is_empty()
                && prefix.chars().all(|c| c.is_ascii_alphanumeric())
                && !tail.is_empty()
                && tail.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

/// SHA-256 of a string, hex-encoded.
pub fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Verify an Ed25519 signature. Malformed hex or keys verify as `false`.
pub fn verify_signature(message: &[u8], signature_hex: &str, public_key_hex: &str) -> bool {
    let (Ok(signature), Ok(public_key)) = (hex::decode(signature_hex), hex::decode(public_key_hex))
    else {
        return false;
    };

    UnparsedPublicKey::new(&signature::ED25519, public_key)
        .verify(message, &signature)
        .is_ok()
}

/// Client-side Ed25519 keypair used to answer challenges.
///
/// Holds the PKCS#8 document, zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct SigningKey {
    pkcs8: Vec<u8>,
    #[zeroize(skip)]
    key_pair: Ed25519KeyPair,
}

impl SigningKey {
    /// Generate a fresh keypair.
    pub fn generate() -> Result<Self, IdentityError> {
        let rng = SystemRandom::new();
        let document =
            Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| IdentityError::KeyGeneration)?;
        Self::from_pkcs8(document.as_ref().to_vec())
    }

    /// Load from a hex-encoded PKCS#8 document.
    pub fn from_pkcs8_hex(encoded: &str) -> Result<Self, IdentityError> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| IdentityError::InvalidKey(e.to_string()))?;
        Self::from_pkcs8(bytes)
    }

    fn from_pkcs8(mut pkcs8: Vec<u8>) -> Result<Self, IdentityError> {
        match Ed25519KeyPair::from_pkcs8(&pkcs8) {
            Ok(key_pair) => Ok(Self { pkcs8, key_pair }),
            Err(e) => {
                pkcs8.zeroize();
                Err(IdentityError::InvalidKey(e.to_string()))
            }
        }
    }

    /// Hex-encoded PKCS#8 document (secret material).
    pub fn to_pkcs8_hex(&self) -> String {
        hex::encode(&self.pkcs8)
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key_pair.public_key().as_ref())
    }

    /// Sign `message`, returning a hex signature.
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.key_pair.sign(message).as_ref())
    }

    /// Sign a challenge nonce as issued by the auth server.
    pub fn sign_challenge(&self, challenge: &str) -> String {
        self.sign(challenge.as_bytes())
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}
