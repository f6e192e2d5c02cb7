//! Per-round broadcast state
//!
//! One [`RoundState`] tracks a single broadcast id: the value being agreed
//! on, echo and ready vote tallies keyed by value digest, the originator's
//! deliver acks, and the monotonic `echo_sent`/`ready_sent`/`delivered`
//! flags. All transitions happen under the round's own lock; vote recording,
//! threshold check, and flag flip are one atomic step.

use std::collections::{HashMap, HashSet};

use tokio::sync::oneshot;

use geowitness_types::{BroadcastValue, PartyId, Tick};

use crate::quorum::QuorumConfig;

/// blake3 digest identifying a candidate value in the vote tallies
pub type ValueDigest = [u8; 32];

/// Digest of a broadcast value's canonical bytes
pub fn digest_value(value: &BroadcastValue) -> ValueDigest {
    let bytes = borsh::to_vec(value).expect("BroadcastValue serialization should not fail");
    *blake3::hash(&bytes).as_bytes()
}

/// Vote tally: candidate values with the set of replicas that voted for each
#[derive(Debug, Default)]
struct Tally {
    candidates: HashMap<ValueDigest, (BroadcastValue, HashSet<PartyId>)>,
}

impl Tally {
    /// Record a vote, returning that value's count afterwards. Repeat votes
    /// from the same replica count once.
    fn record(&mut self, digest: ValueDigest, value: &BroadcastValue, voter: PartyId) -> usize {
        let entry = self
            .candidates
            .entry(digest)
            .or_insert_with(|| (value.clone(), HashSet::new()));
        entry.1.insert(voter);
        entry.1.len()
    }

    fn clear(&mut self) {
        self.candidates.clear();
    }
}

/// State machine for one broadcast id
#[derive(Debug, Default)]
pub struct RoundState {
    /// Value stored from the first SEND
    value: Option<BroadcastValue>,
    echoes: Tally,
    readies: Tally,
    /// Deliver acks collected by the originator
    acks: HashMap<PartyId, BroadcastValue>,
    echo_sent: bool,
    ready_sent: bool,
    delivered: bool,
    /// Highest nonce accepted for this round
    high_nonce: Tick,
    /// Completion signal registered by the originator, fired at ack quorum
    waiter: Option<oneshot::Sender<Vec<BroadcastValue>>>,
}

impl RoundState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    /// Freshness check: accept `nonce` unless it trails the newest accepted
    /// nonce for this round by more than `window` ticks
    pub fn accept_nonce(&mut self, nonce: Tick, window: u64) -> bool {
        if nonce.saturating_add(window) < self.high_nonce {
            return false;
        }
        self.high_nonce = self.high_nonce.max(nonce);
        true
    }

    /// First SEND stores the value and asks for an ECHO relay; any later
    /// SEND is ignored and never restarts the round
    pub fn on_send(&mut self, value: &BroadcastValue) -> Option<BroadcastValue> {
        if self.value.is_some() || self.echo_sent || self.delivered {
            return None;
        }
        self.value = Some(value.clone());
        self.echo_sent = true;
        Some(value.clone())
    }

    /// Record an ECHO vote; promotes to READY once a value's echoes pass
    /// the echo quorum
    pub fn on_echo(
        &mut self,
        voter: PartyId,
        value: &BroadcastValue,
        config: &QuorumConfig,
    ) -> Option<BroadcastValue> {
        if self.delivered {
            return None;
        }
        let count = self.echoes.record(digest_value(value), value, voter);
        if !self.ready_sent && count >= config.echo_quorum() {
            self.ready_sent = true;
            return Some(value.clone());
        }
        None
    }

    /// Record a READY vote. Returns the value to relay READY for (early
    /// promotion on first strong evidence) and the value to deliver, if
    /// either threshold was crossed by this vote.
    pub fn on_ready(
        &mut self,
        voter: PartyId,
        value: &BroadcastValue,
        config: &QuorumConfig,
    ) -> (Option<BroadcastValue>, Option<BroadcastValue>) {
        if self.delivered {
            return (None, None);
        }
        let count = self.readies.record(digest_value(value), value, voter);

        let relay = if !self.ready_sent && count >= config.ready_promotion() {
            self.ready_sent = true;
            Some(value.clone())
        } else {
            None
        };

        let deliver = if count >= config.delivery_quorum() {
            self.delivered = true;
            // Decided: the tallies are no longer needed, and replayed votes
            // cannot restart the round
            self.echoes.clear();
            self.readies.clear();
            Some(value.clone())
        } else {
            None
        };

        (relay, deliver)
    }

    /// Register the originator's completion signal. Fails if one is already
    /// registered.
    pub fn register_waiter(&mut self, waiter: oneshot::Sender<Vec<BroadcastValue>>) -> bool {
        if self.waiter.is_some() {
            return false;
        }
        self.waiter = Some(waiter);
        true
    }

    /// Record a deliver ack; fires the waiter once the ack quorum is reached
    pub fn record_ack(&mut self, from: PartyId, value: BroadcastValue, config: &QuorumConfig) {
        self.acks.insert(from, value);
        if self.acks.len() >= config.ack_quorum() {
            if let Some(waiter) = self.waiter.take() {
                let _ = waiter.send(self.acks.values().cloned().collect());
            }
        }
    }

    /// Whether every replica has acked
    pub fn acks_complete(&self, config: &QuorumConfig) -> bool {
        self.acks.len() >= config.replicas
    }

    /// Drop everything but the delivered flag, leaving a tombstone that
    /// late replays cannot resurrect
    pub fn retire(&mut self) {
        self.value = None;
        self.echoes.clear();
        self.readies.clear();
        self.acks.clear();
        self.waiter = None;
    }
}
