//! Symmetric session keys
//!
//! A session key is shared with exactly one partner, stamped with its
//! creation tick, and valid for a bounded number of ticks. Rotation replaces
//! the cache entry with a new key; an entry is never mutated in place, so
//! in-flight operations holding a clone keep a consistent key.

use geowitness_types::Tick;
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A 256-bit AES session key tagged with its creation tick
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    key: [u8; 32],
    created: Tick,
}

impl SessionKey {
    /// Generate a fresh key from system randomness
    pub fn generate(now: Tick) -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self { key, created: now }
    }

    /// Rebuild a key received from a partner
    pub fn from_bytes(key: [u8; 32], created: Tick) -> Self {
        Self { key, created }
    }

    /// Raw key material
    pub fn bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// Creation tick
    pub fn created(&self) -> Tick {
        self.created
    }

    /// Whether the key is still inside its validity window
    pub fn is_live(&self, now: Tick, validity_ticks: u64) -> bool {
        now.saturating_sub(self.created) < validity_ticks
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log key material
        f.debug_struct("SessionKey")
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_window() {
        let key = SessionKey::generate(10);
        assert!(key.is_live(10, 5));
        assert!(key.is_live(14, 5));
        assert!(!key.is_live(15, 5));
        assert!(!key.is_live(100, 5));
    }

    #[test]
    fn test_generated_keys_differ() {
        let a = SessionKey::generate(0);
        let b = SessionKey::generate(0);
        assert_ne!(a.bytes(), b.bytes());
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = SessionKey::generate(3);
        let shown = format!("{key:?}");
        assert_eq!(shown, "SessionKey { created: 3, .. }");
    }
}
