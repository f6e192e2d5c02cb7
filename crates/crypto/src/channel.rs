//! The pairwise secure channel
//!
//! A [`SecureChannel`] seals and opens every message its owner exchanges
//! with any other party. Replica-to-replica links cache a session key per
//! partner and omit the asymmetric wrap while it is live; client exchanges
//! draw a fresh one-shot key per request and the response is sealed under
//! that same key. Rotation is two-phase: the new key is offered wrapped and
//! signed, and replaces the cached entry only after the partner's ack.

use borsh::to_vec;
use dashmap::DashMap;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use x25519_dalek::StaticSecret;

use geowitness_types::{KeyOffer, PartyId, Role, SecureEnvelope, Tick};

use crate::error::CryptoError;
use crate::hybrid;
use crate::keys::{PartyKeypair, PartyKeys};
use crate::session::SessionKey;

/// A sealed envelope together with the session key it was sealed under,
/// kept by the sender to open the reply
pub struct Sealed {
    pub envelope: SecureEnvelope,
    pub key: SessionKey,
}

/// An opened envelope: recovered plaintext plus the session key it arrived
/// under, kept by the receiver to seal the reply
pub struct Opened {
    pub plaintext: Vec<u8>,
    pub key: SessionKey,
}

/// Per-party secure channel endpoint
pub struct SecureChannel {
    local_id: PartyId,
    signing: SigningKey,
    unwrap_secret: StaticSecret,
    /// Keys this side seals outbound link traffic with
    send_keys: DashMap<PartyId, SessionKey>,
    /// Keys installed from partners' wrapped offers, resolved by sender id
    recv_keys: DashMap<PartyId, SessionKey>,
    validity_ticks: u64,
}

impl SecureChannel {
    pub fn new(local_id: PartyId, keypair: PartyKeypair, validity_ticks: u64) -> Self {
        Self {
            local_id,
            signing: keypair.signing,
            unwrap_secret: keypair.unwrap,
            send_keys: DashMap::new(),
            recv_keys: DashMap::new(),
            validity_ticks,
        }
    }

    pub fn local_id(&self) -> PartyId {
        self.local_id
    }

    /// Session keys are cached only on replica-to-replica links
    fn is_link(&self, partner: PartyId) -> bool {
        Role::of(self.local_id) == Role::Replica && Role::of(partner) == Role::Replica
    }

    fn build(
        &self,
        wrapped_key: Option<Vec<u8>>,
        key: &SessionKey,
        plaintext: &[u8],
    ) -> Result<SecureEnvelope, CryptoError> {
        let payload = hybrid::aead_seal(key.bytes(), plaintext)?;
        let signature = self.signing.sign(plaintext).to_bytes().to_vec();
        Ok(SecureEnvelope {
            sender: self.local_id,
            wrapped_key,
            payload,
            signature,
        })
    }

    /// Seal `plaintext` for `partner`, reusing a live cached session key on
    /// a replica link and drawing a fresh wrapped key otherwise
    pub fn seal(
        &self,
        partner: PartyId,
        partner_keys: &PartyKeys,
        plaintext: &[u8],
        now: Tick,
    ) -> Result<Sealed, CryptoError> {
        if self.is_link(partner) {
            if let Some(cached) = self.send_keys.get(&partner) {
                if cached.is_live(now, self.validity_ticks) {
                    let key = cached.clone();
                    drop(cached);
                    let envelope = self.build(None, &key, plaintext)?;
                    return Ok(Sealed { envelope, key });
                }
            }
        }

        let key = SessionKey::generate(now);
        let wrapped = hybrid::wrap_key(&partner_keys.wrap, key.bytes())?;
        let envelope = self.build(Some(wrapped), &key, plaintext)?;
        if self.is_link(partner) {
            // First contact establishes the link key; the wrap on this very
            // envelope carries it to the partner
            self.send_keys.insert(partner, key.clone());
        }
        Ok(Sealed { envelope, key })
    }

    /// Seal a response under the session key the request arrived with
    pub fn seal_with(
        &self,
        key: &SessionKey,
        plaintext: &[u8],
    ) -> Result<SecureEnvelope, CryptoError> {
        self.build(None, key, plaintext)
    }

    /// Open an inbound envelope from the party holding `sender_keys`
    pub fn open(
        &self,
        envelope: &SecureEnvelope,
        sender_keys: &PartyKeys,
        now: Tick,
    ) -> Result<Opened, CryptoError> {
        let key = match &envelope.wrapped_key {
            Some(blob) => {
                let bytes = hybrid::unwrap_key(&self.unwrap_secret, blob)?;
                let key = SessionKey::from_bytes(bytes, now);
                if self.is_link(envelope.sender) {
                    self.recv_keys.insert(envelope.sender, key.clone());
                }
                key
            }
            None => {
                let cached = self
                    .recv_keys
                    .get(&envelope.sender)
                    .ok_or(CryptoError::NoSessionKey(envelope.sender))?;
                if !cached.is_live(now, self.validity_ticks) {
                    return Err(CryptoError::NoSessionKey(envelope.sender));
                }
                cached.clone()
            }
        };

        let plaintext = hybrid::aead_open(key.bytes(), &envelope.payload)?;
        verify_message(&sender_keys.sign, &plaintext, &envelope.signature)?;
        Ok(Opened { plaintext, key })
    }

    /// Open a reply sealed under a key this side already holds
    pub fn open_reply(
        &self,
        envelope: &SecureEnvelope,
        sender_keys: &PartyKeys,
        key: &SessionKey,
    ) -> Result<Vec<u8>, CryptoError> {
        let plaintext = hybrid::aead_open(key.bytes(), &envelope.payload)?;
        verify_message(&sender_keys.sign, &plaintext, &envelope.signature)?;
        Ok(plaintext)
    }

    /// Whether the cached send key for `partner` is inside its validity
    /// window
    pub fn session_is_live(&self, partner: PartyId, now: Tick) -> bool {
        self.send_keys
            .get(&partner)
            .map(|key| key.is_live(now, self.validity_ticks))
            .unwrap_or(false)
    }

    /// Start a rotation: a wrapped, signed key offer for the partner plus
    /// the pending key to commit once the partner acks
    pub fn begin_rotation(
        &self,
        partner_keys: &PartyKeys,
        now: Tick,
    ) -> Result<(SecureEnvelope, SessionKey), CryptoError> {
        let key = SessionKey::generate(now);
        let offer = KeyOffer { created_tick: now };
        let plaintext = to_vec(&offer).expect("KeyOffer serialization should not fail");
        let wrapped = hybrid::wrap_key(&partner_keys.wrap, key.bytes())?;
        let envelope = self.build(Some(wrapped), &key, &plaintext)?;
        Ok((envelope, key))
    }

    /// Install a rotated key after the partner acknowledged the offer.
    /// Replaces the entry; clones held by in-flight sends stay consistent.
    pub fn commit_rotation(&self, partner: PartyId, pending: SessionKey) {
        self.send_keys.insert(partner, pending);
        tracing::debug!(partner, "session key rotated");
    }
}

/// Sign `message`, returning detached signature bytes
pub fn sign_message(key: &SigningKey, message: &[u8]) -> Vec<u8> {
    key.sign(message).to_bytes().to_vec()
}

/// Verify a detached ed25519 signature over `message`
pub fn verify_message(
    key: &VerifyingKey,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| CryptoError::SignatureInvalid)?;
    let signature = Signature::from_bytes(&bytes);
    key.verify(message, &signature)
        .map_err(|_| CryptoError::SignatureInvalid)
}
