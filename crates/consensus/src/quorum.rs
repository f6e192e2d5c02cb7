//! Quorum thresholds
//!
//! Classic double-echo thresholds over `N` replicas tolerating `f` Byzantine
//! ones: echo promotion strictly above `(N+f)/2`, ready promotion strictly
//! above `f`, delivery strictly above `2f`, and the originator's deliver-ack
//! quorum strictly above `(N+f)/2`. The shipped default fixes `f = 0`; the
//! thresholds are only meaningful for genuine tolerance when `N > 3f`.

/// Default freshness window for broadcast nonces, in ticks
pub const DEFAULT_FRESHNESS_WINDOW: u64 = 16;

/// Cluster quorum parameters
#[derive(Debug, Clone, Copy)]
pub struct QuorumConfig {
    /// Number of replicas, N
    pub replicas: usize,
    /// Tolerated Byzantine replicas, f
    pub faults: usize,
    /// Ticks an envelope's nonce may trail the round's newest accepted nonce
    pub freshness_window: u64,
}

impl QuorumConfig {
    pub fn new(replicas: usize, faults: usize) -> Self {
        Self {
            replicas,
            faults,
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
        }
    }

    /// Matching echo votes needed to send READY: > (N + f) / 2
    pub fn echo_quorum(&self) -> usize {
        (self.replicas + self.faults) / 2 + 1
    }

    /// Matching ready votes that promote a replica to READY early: > f
    pub fn ready_promotion(&self) -> usize {
        self.faults + 1
    }

    /// Matching ready votes needed to deliver: > 2f
    pub fn delivery_quorum(&self) -> usize {
        2 * self.faults + 1
    }

    /// Deliver acks the originator waits for: > (N + f) / 2
    pub fn ack_quorum(&self) -> usize {
        (self.replicas + self.faults) / 2 + 1
    }
}
