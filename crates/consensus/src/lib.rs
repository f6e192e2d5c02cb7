//! Byzantine double-echo reliable broadcast
//!
//! One [`RoundState`] per broadcast id runs the SEND/ECHO/READY/DELIVER
//! protocol; the [`BroadcastEngine`] keys live rounds by id and turns each
//! inbound message into the relay and delivery actions the coordinator must
//! execute. The engine is transport-free: sealing, fanout, and store apply
//! all happen above it.

pub mod engine;
pub mod error;
pub mod quorum;
pub mod round;

pub use engine::{Action, BroadcastEngine};
pub use error::BroadcastError;
pub use quorum::{QuorumConfig, DEFAULT_FRESHNESS_WINDOW};
pub use round::{digest_value, RoundState, ValueDigest};
