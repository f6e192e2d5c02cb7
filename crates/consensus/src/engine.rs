//! The broadcast engine
//!
//! Keys live rounds by [`BroadcastId`] in a concurrent map, one lock per
//! round, and translates inbound protocol messages into the actions the
//! coordinator executes: relaying ECHO/READY to the cluster, or applying a
//! delivered value and acking the originator. The engine never touches the
//! transport or the store.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use geowitness_types::{BroadcastEnvelope, BroadcastId, BroadcastValue, PartyId, Role};

use crate::error::BroadcastError;
use crate::quorum::QuorumConfig;
use crate::round::RoundState;

/// What the coordinator must do after feeding a message to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Relay an ECHO of this value to every replica
    RelayEcho(BroadcastValue),
    /// Relay a READY of this value to every replica
    RelayReady(BroadcastValue),
    /// Apply the decided value locally and ack the round's originator
    Deliver(BroadcastValue),
}

pub struct BroadcastEngine {
    config: QuorumConfig,
    rounds: DashMap<BroadcastId, Arc<Mutex<RoundState>>>,
}

impl BroadcastEngine {
    pub fn new(config: QuorumConfig) -> Self {
        Self {
            config,
            rounds: DashMap::new(),
        }
    }

    pub fn config(&self) -> &QuorumConfig {
        &self.config
    }

    /// Broadcast-internal traffic must be attributable to a replica
    fn check_origin(id: BroadcastId) -> Result<(), BroadcastError> {
        if Role::of(id.origin) != Role::Replica {
            return Err(BroadcastError::ForeignOrigin(id, id.origin));
        }
        Ok(())
    }

    /// Round state for `id`, created on first sight
    fn round(&self, id: BroadcastId) -> Arc<Mutex<RoundState>> {
        self.rounds.entry(id).or_default().clone()
    }

    /// Register the local replica as the originator of `id`. The returned
    /// receiver resolves with the collected acks once the ack quorum is
    /// reached.
    pub fn originate(
        &self,
        id: BroadcastId,
    ) -> Result<oneshot::Receiver<Vec<BroadcastValue>>, BroadcastError> {
        Self::check_origin(id)?;
        let round = self.round(id);
        let mut state = round.lock();
        let (tx, rx) = oneshot::channel();
        if !state.register_waiter(tx) {
            return Err(BroadcastError::AlreadyOriginated(id));
        }
        Ok(rx)
    }

    pub fn on_send(&self, env: &BroadcastEnvelope) -> Result<Vec<Action>, BroadcastError> {
        Self::check_origin(env.id)?;
        let round = self.round(env.id);
        let mut state = round.lock();
        if !state.accept_nonce(env.nonce, self.config.freshness_window) {
            return Err(BroadcastError::StaleMessage(env.id));
        }
        Ok(state
            .on_send(&env.value)
            .map(Action::RelayEcho)
            .into_iter()
            .collect())
    }

    pub fn on_echo(
        &self,
        from: PartyId,
        env: &BroadcastEnvelope,
    ) -> Result<Vec<Action>, BroadcastError> {
        Self::check_origin(env.id)?;
        let round = self.round(env.id);
        let mut state = round.lock();
        if !state.accept_nonce(env.nonce, self.config.freshness_window) {
            return Err(BroadcastError::StaleMessage(env.id));
        }
        Ok(state
            .on_echo(from, &env.value, &self.config)
            .map(Action::RelayReady)
            .into_iter()
            .collect())
    }

    pub fn on_ready(
        &self,
        from: PartyId,
        env: &BroadcastEnvelope,
    ) -> Result<Vec<Action>, BroadcastError> {
        Self::check_origin(env.id)?;
        let round = self.round(env.id);
        let mut state = round.lock();
        if !state.accept_nonce(env.nonce, self.config.freshness_window) {
            return Err(BroadcastError::StaleMessage(env.id));
        }
        let (relay, deliver) = state.on_ready(from, &env.value, &self.config);
        let mut actions = Vec::with_capacity(2);
        if let Some(value) = relay {
            actions.push(Action::RelayReady(value));
        }
        if let Some(value) = deliver {
            tracing::debug!(round = %env.id, "broadcast value delivered");
            actions.push(Action::Deliver(value));
        }
        Ok(actions)
    }

    /// Record a deliver ack at the originator. Acks for unknown rounds are
    /// ignored; a round whose every replica has acked is retired to a
    /// tombstone.
    pub fn on_deliver_ack(
        &self,
        from: PartyId,
        env: &BroadcastEnvelope,
    ) -> Result<(), BroadcastError> {
        Self::check_origin(env.id)?;
        let Some(round) = self.rounds.get(&env.id).map(|entry| Arc::clone(entry.value())) else {
            return Ok(());
        };
        let mut state = round.lock();
        if !state.accept_nonce(env.nonce, self.config.freshness_window) {
            return Err(BroadcastError::StaleMessage(env.id));
        }
        state.record_ack(from, env.value.clone(), &self.config);
        if state.acks_complete(&self.config) {
            state.retire();
        }
        Ok(())
    }

    /// Number of rounds currently held (live rounds plus tombstones)
    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }
}
