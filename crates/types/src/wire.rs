//! Wire units exchanged between parties
//!
//! Two layers travel on the wire. The outer [`SecureEnvelope`] is what the
//! transport carries: hybrid-encrypted payload plus a signature over the
//! plaintext. The inner plaintext is one of the borsh-encoded bodies below
//! ([`ClientRequest`], [`BroadcastEnvelope`], [`KeyOffer`], [`Reply`]).

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::{Epoch, Tick};
use crate::identity::PartyId;
use crate::report::{LocationReport, StoredRecord};

/// Outer wire unit between any two parties
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct SecureEnvelope {
    /// Claimed sender id; bound by the signature check on open
    pub sender: PartyId,
    /// Asymmetrically wrapped symmetric key; absent when the receiver should
    /// resolve a cached session key by `sender`
    pub wrapped_key: Option<Vec<u8>>,
    /// Fresh random nonce followed by the AES-GCM ciphertext
    pub payload: Vec<u8>,
    /// Ed25519 signature over the plaintext
    pub signature: Vec<u8>,
}

impl SecureEnvelope {
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("SecureEnvelope serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}

/// Names one broadcast round: the originating replica and its sequence number
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct BroadcastId {
    pub origin: PartyId,
    pub seq: u64,
}

impl std::fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.origin, self.seq)
    }
}

/// The value a broadcast round agrees on, or an ack flowing back to the
/// round's originator
#[derive(Debug, Clone, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum BroadcastValue {
    /// Replicate a validated report write
    Write { report: LocationReport, write_ts: Tick },
    /// Replicate a read of `(user, epoch)`
    Read { user: PartyId, epoch: Epoch },
    /// Deliver ack for a write: the timestamp the store holds after apply
    WriteAck { applied_ts: Tick },
    /// Deliver ack for a read: the record this replica holds, if any
    ReadResult { record: Option<StoredRecord> },
}

/// One broadcast-internal message, carried inside a [`SecureEnvelope`]
#[derive(Debug, Clone, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    pub id: BroadcastId,
    /// Creation tick; receivers reject values trailing the round's freshness
    /// window
    pub nonce: Tick,
    pub value: BroadcastValue,
}

impl BroadcastEnvelope {
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("BroadcastEnvelope serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}

/// Endpoint selector accompanying each envelope on the transport
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum Operation {
    SubmitWrite,
    ObtainRead,
    BcastSend,
    BcastEcho,
    BcastReady,
    BcastDeliver,
    KeyExchange,
    KeyRefresh,
}

/// Transport request: operation plus sealed envelope
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct WireRequest {
    pub op: Operation,
    pub envelope: SecureEnvelope,
}

impl WireRequest {
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("WireRequest serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}

/// Transport response: sealed envelope only
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct WireResponse {
    pub envelope: SecureEnvelope,
}

impl WireResponse {
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("WireResponse serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}

/// Client-facing request bodies
#[derive(Debug, Clone, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum ClientRequest {
    Submit { report: LocationReport },
    Obtain { user: PartyId, epoch: Epoch },
}

/// Session-key offer body; the new key itself rides in the envelope's
/// `wrapped_key` field
#[derive(Debug, Clone, Copy, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct KeyOffer {
    pub created_tick: Tick,
}

/// Response bodies, sealed back to the caller
#[derive(Debug, Clone, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum Reply {
    SubmitOk { applied_ts: Tick },
    Record { record: Option<StoredRecord> },
    KeyAck,
    BcastAck,
    Err(ErrorCode),
}

/// Externally visible failure taxonomy
#[derive(
    Error,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum ErrorCode {
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("payload could not be decrypted")]
    DecryptionFailed,
    #[error("message nonce is stale")]
    StaleMessage,
    #[error("broadcast traffic from a non-replica id")]
    ForeignOrigin,
    #[error("a report already exists for this user and epoch")]
    RecordConflict,
    #[error("report proofs are not acceptable")]
    RecordNotAcceptable,
    #[error("sender is not authorized for this request")]
    Unauthorized,
    #[error("broadcast round timed out")]
    BroadcastTimeout,
    #[error("internal replica error")]
    Internal,
}
