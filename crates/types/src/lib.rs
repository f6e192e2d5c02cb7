//! Shared types for the geowitness location-report cluster
//!
//! This crate carries the data model every other crate agrees on:
//! - Party identities and role ranges (clients, health authority, replicas)
//! - Location reports and witness proofs
//! - Wire envelopes for the secure channel and the broadcast protocol
//! - The logical clock used for nonces and session-key ages

pub mod clock;
pub mod identity;
pub mod report;
pub mod wire;

pub use clock::{Epoch, LogicalClock, Tick};
pub use identity::{replica_id, replica_index, PartyId, Role, AUTHORITY_ID, REPLICA_ID_OFFSET};
pub use report::{
    LocationProof, LocationReport, Position, ProofBody, ProofOutcome, StoredRecord,
};
pub use wire::{
    BroadcastEnvelope, BroadcastId, BroadcastValue, ClientRequest, ErrorCode, KeyOffer, Operation,
    Reply, SecureEnvelope, WireRequest, WireResponse,
};

/// Default witness detection range, in grid units
pub const DEFAULT_DETECTION_RANGE: f64 = 2.0;
