//! Secure channel for the geowitness cluster
//!
//! Every message between any two parties travels as a [`SecureEnvelope`]:
//! the payload is AES-256-GCM encrypted under a symmetric session key, the
//! session key is wrapped asymmetrically for the recipient (ephemeral x25519
//! ECDH, HKDF-SHA256, AES-GCM), and the plaintext is ed25519-signed by the
//! sender. Replica-to-replica links cache session keys and rotate them
//! explicitly; client exchanges use a fresh one-shot key per request.
//!
//! [`SecureEnvelope`]: geowitness_types::SecureEnvelope

pub mod channel;
pub mod error;
pub mod hybrid;
pub mod keys;
pub mod session;

pub use channel::{sign_message, verify_message, Opened, Sealed, SecureChannel};
pub use error::CryptoError;
pub use keys::{
    directory_of, generate_cluster_keys, load_cluster_keys, save_cluster_keys, KeyRing,
    PartyKeypair, PartyKeys,
};
pub use session::SessionKey;

/// Default session-key validity, in logical ticks
pub const DEFAULT_SESSION_VALIDITY_TICKS: u64 = 64;
