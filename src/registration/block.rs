//! Registration block: identity plus consent, submitted for admin approval.
//!
//! The public `identity` section carries only hashes of the identifiers (plus
//! the display name and app type). Plain identifiers travel in
//! `identityPrivate` for the admin and are not part of the block hash.
//!
//! `blockHash` covers `identity`, `consent`, `metadata.createdAt` and
//! `metadata.nonce`, so stamping `submittedAt` or updating the status never
//! invalidates it.

use super::status::RegistrationStatus;
use crate::clock::Millis;
use crate::identity::{self, Identity};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const BLOCK_TYPE: &str = "USER_REGISTRATION";
pub const BLOCK_VERSION: &str = "1.0.0";

const ANONYMOUS: &str = "Anonymous";
const UNKNOWN_APP: &str = "unknown";

/// Consent record produced when the user accepts the terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consent {
    pub terms_version: String,
    pub terms_hash: String,
    #[serde(default)]
    pub accepted_at: Option<Millis>,
    #[serde(default = "default_true")]
    pub age_confirmed: bool,
    #[serde(default)]
    pub signature: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashedIdentity {
    pub user_id_hash: String,
    pub public_key_hash: String,
    pub hardware_id_hash: String,
    pub username: String,
    pub app_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateIdentity {
    pub user_id: String,
    #[serde(default)]
    pub node_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMetadata {
    pub created_at: Millis,
    #[serde(default)]
    pub submitted_at: Option<Millis>,
    pub nonce: u32,
}

/// Current adjudication state plus who set it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub current: RegistrationStatus,
    #[serde(default)]
    pub updated_at: Option<Millis>,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<RegistrationStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationBlock {
    pub block_type: String,
    pub block_id: String,
    pub version: String,
    pub identity: HashedIdentity,
    pub identity_private: PrivateIdentity,
    pub consent: Consent,
    pub metadata: BlockMetadata,
    pub status: StatusRecord,
    pub block_hash: String,
    /// Set once a relay has confirmed receipt.
    #[serde(default)]
    pub relay_acknowledged: bool,
}

/// Why a block could not be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    #[error("Identity required for registration")]
    MissingIdentity,

    #[error("Consent required for registration")]
    MissingConsent,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashedMetadata {
    created_at: Millis,
    nonce: u32,
}

#[derive(Serialize)]
struct HashInput<'a> {
    identity: &'a HashedIdentity,
    consent: &'a Consent,
    metadata: HashedMetadata,
}

impl RegistrationBlock {
    /// Build a fresh `pending` block.
    pub fn create(
        peer: &Identity,
        consent: &Consent,
        created_at: Millis,
    ) -> Result<Self, BlockError> {
        if peer.user_id.is_empty() {
            return Err(BlockError::MissingIdentity);
        }
        if consent.terms_version.is_empty() {
            return Err(BlockError::MissingConsent);
        }

        let non_empty_or = |value: Option<&str>, fallback: &str| {
            value
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };

        let mut block = Self {
            block_type: BLOCK_TYPE.to_string(),
            block_id: identity::registration_block_id(),
            version: BLOCK_VERSION.to_string(),
            identity: HashedIdentity {
                user_id_hash: identity::sha256_hex(&peer.user_id),
                public_key_hash: identity::sha256_hex(&peer.public_key),
                hardware_id_hash: identity::sha256_hex(&peer.hardware_fingerprint_hash),
                username: non_empty_or(Some(peer.display_name.as_str()), ANONYMOUS),
                app_type: non_empty_or(peer.app_type.as_deref(), UNKNOWN_APP),
            },
            identity_private: PrivateIdentity {
                user_id: peer.user_id.clone(),
                node_id: peer.node_id.clone(),
            },
            consent: consent.clone(),
            metadata: BlockMetadata {
                created_at,
                submitted_at: None,
                nonce: rand::thread_rng().gen_range(0..1_000_000),
            },
            status: StatusRecord {
                current: RegistrationStatus::Pending,
                updated_at: None,
                updated_by: None,
                reason: None,
                previous_status: None,
            },
            block_hash: String::new(),
            relay_acknowledged: false,
        };

        block.block_hash = block.compute_hash();
        Ok(block)
    }

    /// SHA-256 over the canonical JSON of the hashed fields.
    pub fn compute_hash(&self) -> String {
        let input = HashInput {
            identity: &self.identity,
            consent: &self.consent,
            metadata: HashedMetadata {
                created_at: self.metadata.created_at,
                nonce: self.metadata.nonce,
            },
        };

        // Plain structs of strings and integers always serialize
        let canonical = serde_json::to_string(&input).unwrap_or_default();
        identity::sha256_hex(&canonical)
    }

    pub fn current_status(&self) -> RegistrationStatus {
        self.status.current
    }
}

/// Whether `block.block_hash` matches its contents.
pub fn verify_block_hash(block: &RegistrationBlock) -> bool {
    block.block_hash == block.compute_hash()
}
