//! Hybrid encryption primitives
//!
//! Payloads are sealed with AES-256-GCM under a symmetric session key; the
//! session key itself is wrapped for the recipient with an ephemeral x25519
//! Diffie-Hellman exchange, HKDF-SHA256 key derivation, and AES-GCM. Every
//! encryption draws a fresh random nonce and transmits it ahead of the
//! ciphertext.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::CryptoError;

/// AES-GCM nonce length, prefixed to every ciphertext
pub const AEAD_NONCE_LEN: usize = 12;

/// Length of a wrapped session key: ephemeral public key, nonce, ciphertext
/// of 32 key bytes plus the 16-byte GCM tag
pub const WRAPPED_KEY_LEN: usize = 32 + AEAD_NONCE_LEN + 32 + 16;

const WRAP_INFO: &[u8] = b"geowitness session key wrap v1";

/// Encrypt `plaintext` under `key`; output is `nonce || ciphertext`
pub fn aead_seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce = [0u8; AEAD_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    let mut out = Vec::with_capacity(AEAD_NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a `nonce || ciphertext` blob produced by [`aead_seal`]
pub fn aead_open(key: &[u8; 32], blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < AEAD_NONCE_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let (nonce, ciphertext) = blob.split_at(AEAD_NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Wrap a session key for `recipient`
pub fn wrap_key(recipient: &PublicKey, session_key: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_pub = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);
    let kek = derive_wrap_key(ephemeral_pub.as_bytes(), shared.as_bytes())?;
    let sealed = aead_seal(&kek, session_key)?;
    let mut out = Vec::with_capacity(32 + sealed.len());
    out.extend_from_slice(ephemeral_pub.as_bytes());
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Unwrap a session key addressed to `local`
pub fn unwrap_key(local: &StaticSecret, blob: &[u8]) -> Result<[u8; 32], CryptoError> {
    if blob.len() != WRAPPED_KEY_LEN {
        return Err(CryptoError::MalformedKey);
    }
    let (ephemeral_bytes, sealed) = blob.split_at(32);
    let ephemeral_arr: [u8; 32] = ephemeral_bytes
        .try_into()
        .map_err(|_| CryptoError::MalformedKey)?;
    let ephemeral_pub = PublicKey::from(ephemeral_arr);
    let shared = local.diffie_hellman(&ephemeral_pub);
    let kek = derive_wrap_key(ephemeral_bytes, shared.as_bytes())?;
    let key = aead_open(&kek, sealed)?;
    key.as_slice()
        .try_into()
        .map_err(|_| CryptoError::MalformedKey)
}

fn derive_wrap_key(salt: &[u8], ikm: &[u8]) -> Result<[u8; 32], CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; 32];
    hk.expand(WRAP_INFO, &mut okm)
        .map_err(|_| CryptoError::MalformedKey)?;
    Ok(okm)
}
