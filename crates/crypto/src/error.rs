//! Crypto layer errors

use geowitness_types::PartyId;
use thiserror::Error;

/// Secure-channel and key-provisioning errors
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("payload could not be decrypted")]
    DecryptionFailed,

    #[error("payload could not be encrypted")]
    EncryptionFailed,

    #[error("malformed key material")]
    MalformedKey,

    #[error("no live session key cached for partner {0}")]
    NoSessionKey(PartyId),

    #[error("key file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key file parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
