//! Logical time source
//!
//! The cluster runs on logical ticks, not wall time. Ticks stamp broadcast
//! nonces, write timestamps, and session-key ages; epochs partition the
//! report key space. The simulated environment (or the node's tick loop)
//! advances the clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Logical clock tick
pub type Tick = u64;

/// Report epoch
pub type Epoch = u64;

/// Shared monotonic tick counter
#[derive(Debug, Clone, Default)]
pub struct LogicalClock {
    ticks: Arc<AtomicU64>,
}

impl LogicalClock {
    /// Create a clock starting at tick 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock starting at a given tick
    pub fn starting_at(tick: Tick) -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(tick)),
        }
    }

    /// Current tick
    pub fn now(&self) -> Tick {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Advance by one tick, returning the new value
    pub fn advance(&self) -> Tick {
        self.ticks.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Move forward to `tick` if it is ahead of the current value
    pub fn advance_to(&self, tick: Tick) {
        self.ticks.fetch_max(tick, Ordering::SeqCst);
    }
}
