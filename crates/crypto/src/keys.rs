//! Key provisioning and the public-key directory
//!
//! Each party holds an ed25519 signing key and an x25519 unwrap secret. The
//! provisioning utility generates the whole cluster's key material and hands
//! every party a [`KeyRing`] directory of public halves, addressable by id.
//! Key files are JSON with base58-encoded secrets.

use std::collections::HashMap;
use std::path::Path;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

use geowitness_types::{replica_id, PartyId, AUTHORITY_ID};

use crate::error::CryptoError;

/// One party's private key material
#[derive(Clone)]
pub struct PartyKeypair {
    pub signing: SigningKey,
    pub unwrap: StaticSecret,
}

impl PartyKeypair {
    /// Generate fresh key material from system randomness
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
            unwrap: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Public halves of this keypair
    pub fn public(&self) -> PartyKeys {
        PartyKeys {
            sign: self.signing.verifying_key(),
            wrap: PublicKey::from(&self.unwrap),
        }
    }
}

/// One party's public keys, as served by the directory
#[derive(Debug, Clone)]
pub struct PartyKeys {
    pub sign: VerifyingKey,
    pub wrap: PublicKey,
}

/// Directory of every party's public keys, passed explicitly to whoever
/// needs to address a partner
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    directory: HashMap<PartyId, PartyKeys>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: PartyId, keys: PartyKeys) {
        self.directory.insert(id, keys);
    }

    /// Public keys of `id`, if provisioned
    pub fn get(&self, id: PartyId) -> Option<&PartyKeys> {
        self.directory.get(&id)
    }

    pub fn contains(&self, id: PartyId) -> bool {
        self.directory.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.directory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }
}

/// Generate keypairs for the given client ids, the health authority, and
/// `replicas` server replicas
pub fn generate_cluster_keys(
    client_ids: &[PartyId],
    replicas: usize,
) -> HashMap<PartyId, PartyKeypair> {
    let mut out = HashMap::new();
    for &id in client_ids {
        out.insert(id, PartyKeypair::generate());
    }
    out.insert(AUTHORITY_ID, PartyKeypair::generate());
    for index in 0..replicas {
        out.insert(replica_id(index), PartyKeypair::generate());
    }
    out
}

/// Build the public directory for a set of keypairs
pub fn directory_of(keys: &HashMap<PartyId, PartyKeypair>) -> KeyRing {
    let mut ring = KeyRing::new();
    for (&id, keypair) in keys {
        ring.insert(id, keypair.public());
    }
    ring
}

#[derive(Serialize, Deserialize)]
struct KeyFileEntry {
    id: PartyId,
    signing: String,
    unwrap: String,
}

/// Write cluster key material to a JSON key file
pub fn save_cluster_keys(
    path: &Path,
    keys: &HashMap<PartyId, PartyKeypair>,
) -> Result<(), CryptoError> {
    let mut entries: Vec<KeyFileEntry> = keys
        .iter()
        .map(|(&id, keypair)| KeyFileEntry {
            id,
            signing: bs58::encode(keypair.signing.to_bytes()).into_string(),
            unwrap: bs58::encode(keypair.unwrap.to_bytes()).into_string(),
        })
        .collect();
    entries.sort_by_key(|entry| entry.id);
    let json = serde_json::to_string_pretty(&entries)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Load cluster key material from a JSON key file
pub fn load_cluster_keys(path: &Path) -> Result<HashMap<PartyId, PartyKeypair>, CryptoError> {
    let json = std::fs::read_to_string(path)?;
    let entries: Vec<KeyFileEntry> = serde_json::from_str(&json)?;
    let mut out = HashMap::new();
    for entry in entries {
        let signing = decode_key32(&entry.signing)?;
        let unwrap = decode_key32(&entry.unwrap)?;
        out.insert(
            entry.id,
            PartyKeypair {
                signing: SigningKey::from_bytes(&signing),
                unwrap: StaticSecret::from(unwrap),
            },
        );
    }
    Ok(out)
}

fn decode_key32(encoded: &str) -> Result<[u8; 32], CryptoError> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|_| CryptoError::MalformedKey)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::MalformedKey)
}
