//! Replica Configuration

use serde::{Deserialize, Serialize};

use geowitness_consensus::{QuorumConfig, DEFAULT_FRESHNESS_WINDOW};
use geowitness_crypto::DEFAULT_SESSION_VALIDITY_TICKS;
use geowitness_types::DEFAULT_DETECTION_RANGE;

/// Replica configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Number of replicas in the cluster, N
    pub replicas: usize,
    /// Tolerated Byzantine replicas, f
    pub faults: usize,
    /// Witness detection range, in grid units
    pub detection_range: f64,
    /// Session-key validity, in logical ticks
    pub session_validity_ticks: u64,
    /// Ticks a broadcast nonce may trail a round's newest accepted nonce
    pub freshness_window: u64,
    /// Deadline for a broadcast round to reach its ack quorum
    pub round_timeout_ms: u64,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            replicas: 4,
            faults: 0,
            detection_range: DEFAULT_DETECTION_RANGE,
            session_validity_ticks: DEFAULT_SESSION_VALIDITY_TICKS,
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            round_timeout_ms: 30_000,
        }
    }
}

impl ReplicaConfig {
    /// Quorum parameters derived from this configuration
    pub fn quorum(&self) -> QuorumConfig {
        QuorumConfig {
            replicas: self.replicas,
            faults: self.faults,
            freshness_window: self.freshness_window,
        }
    }

    pub fn round_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.round_timeout_ms)
    }
}
