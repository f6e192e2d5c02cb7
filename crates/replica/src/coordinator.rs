//! The replica coordinator
//!
//! One coordinator runs per replica. It opens every inbound envelope through
//! the secure channel, dispatches it by operation (client submit/obtain,
//! broadcast-internal traffic, session-key exchange), executes the broadcast
//! engine's relay and delivery actions, and bridges delivered values to the
//! record store. Every response, rejections included, is sealed back to the
//! caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use geowitness_consensus::{Action, BroadcastEngine, BroadcastError};
use geowitness_crypto::{KeyRing, PartyKeypair, PartyKeys, SecureChannel, SessionKey};
use geowitness_proofs::ProofValidator;
use geowitness_types::{
    replica_id, BroadcastEnvelope, BroadcastId, BroadcastValue, ClientRequest, KeyOffer,
    LogicalClock, Operation, PartyId, Reply, Role, SecureEnvelope, WireRequest, WireResponse,
    AUTHORITY_ID,
};

use crate::config::ReplicaConfig;
use crate::error::CoordError;
use crate::store::RecordStore;
use crate::transport::{RequestHandler, Transport};

pub struct Coordinator {
    id: PartyId,
    config: ReplicaConfig,
    channel: SecureChannel,
    directory: KeyRing,
    validator: ProofValidator,
    engine: BroadcastEngine,
    store: RecordStore,
    clock: LogicalClock,
    transport: Arc<dyn Transport>,
    next_seq: AtomicU64,
}

impl Coordinator {
    pub fn new(
        index: usize,
        keypair: PartyKeypair,
        directory: KeyRing,
        config: ReplicaConfig,
        clock: LogicalClock,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let id = replica_id(index);
        let channel = SecureChannel::new(id, keypair, config.session_validity_ticks);
        let validator = ProofValidator::new(config.detection_range);
        let engine = BroadcastEngine::new(config.quorum());
        Arc::new(Self {
            id,
            config,
            channel,
            directory,
            validator,
            engine,
            store: RecordStore::new(),
            clock,
            transport,
            next_seq: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> PartyId {
        self.id
    }

    /// This replica's record store
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    fn keys_of(&self, id: PartyId) -> Result<PartyKeys, CoordError> {
        self.directory
            .get(id)
            .cloned()
            .ok_or(CoordError::UnknownParty(id))
    }

    // ------------------------------------------------------------------
    // Client path
    // ------------------------------------------------------------------

    async fn handle_submit(&self, sender: PartyId, plaintext: &[u8]) -> Result<Reply, CoordError> {
        let ClientRequest::Submit { report } = decode::<ClientRequest>(plaintext)? else {
            return Err(CoordError::MalformedBody);
        };

        // 1. Only clients submit, and only for themselves
        if Role::of(sender) != Role::Client || report.user != sender {
            return Err(CoordError::Unauthorized(sender));
        }

        // 2. Strict proof validation; no partial acceptance
        self.validator.verify_all(&report, &self.directory)?;

        // 3. Duplicate submissions never overwrite the store
        if self.store.exists(report.user, report.epoch) {
            return Err(CoordError::RecordConflict(report.user, report.epoch));
        }

        // 4. Replicate through a write round
        let write_ts = self.clock.advance();
        let user = report.user;
        let epoch = report.epoch;
        let acks = self
            .run_round(BroadcastValue::Write { report, write_ts })
            .await?;

        let applied_ts = acks
            .iter()
            .filter_map(|ack| match ack {
                BroadcastValue::WriteAck { applied_ts } => Some(*applied_ts),
                _ => None,
            })
            .max()
            .ok_or(CoordError::MalformedBody)?;

        tracing::info!(user, epoch, applied_ts, "report accepted");
        Ok(Reply::SubmitOk { applied_ts })
    }

    async fn handle_obtain(&self, sender: PartyId, plaintext: &[u8]) -> Result<Reply, CoordError> {
        let ClientRequest::Obtain { user, epoch } = decode::<ClientRequest>(plaintext)? else {
            return Err(CoordError::MalformedBody);
        };

        // Clients read their own history; the health authority reads anyone's
        if sender != user && sender != AUTHORITY_ID {
            return Err(CoordError::Unauthorized(sender));
        }

        let acks = self.run_round(BroadcastValue::Read { user, epoch }).await?;

        // Reconcile: the non-absent reply with the newest embedded write
        // timestamp wins; absent only if every reply was absent
        let record = acks
            .iter()
            .filter_map(|ack| match ack {
                BroadcastValue::ReadResult { record } => record.clone(),
                _ => None,
            })
            .max_by_key(|record| record.write_ts);

        Ok(Reply::Record { record })
    }

    // ------------------------------------------------------------------
    // Broadcast rounds
    // ------------------------------------------------------------------

    /// Originate a round for `value` and block until the ack quorum is
    /// reached or the deadline fires
    async fn run_round(&self, value: BroadcastValue) -> Result<Vec<BroadcastValue>, CoordError> {
        // Session keys must be fresh before broadcast-internal traffic flows
        self.refresh_peer_sessions().await?;

        let id = BroadcastId {
            origin: self.id,
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst) + 1,
        };
        let rx = self.engine.originate(id)?;

        let env = BroadcastEnvelope {
            id,
            nonce: self.clock.now(),
            value,
        };
        self.fanout(Operation::BcastSend, &env)?;

        match tokio::time::timeout(self.config.round_timeout(), rx).await {
            Ok(Ok(acks)) => Ok(acks),
            Ok(Err(_)) | Err(_) => {
                tracing::warn!(round = %id, "broadcast round timed out");
                Err(CoordError::Broadcast(BroadcastError::Timeout(id)))
            }
        }
    }

    /// Rotate the session key with every peer whose cached key has left its
    /// validity window. Blocking: each offer must be acked before the round
    /// starts.
    async fn refresh_peer_sessions(&self) -> Result<(), CoordError> {
        for index in 0..self.config.replicas {
            let peer = replica_id(index);
            let now = self.clock.now();
            if self.channel.session_is_live(peer, now) {
                continue;
            }
            let keys = self.keys_of(peer)?;
            let (offer, pending) = self.channel.begin_rotation(&keys, now)?;
            let request = WireRequest {
                op: Operation::KeyRefresh,
                envelope: offer,
            };
            let response = self.transport.request(peer, request).await?;
            let plaintext = self.channel.open_reply(&response.envelope, &keys, &pending)?;
            match decode::<Reply>(&plaintext)? {
                Reply::KeyAck => self.channel.commit_rotation(peer, pending),
                _ => return Err(CoordError::MalformedBody),
            }
        }
        Ok(())
    }

    /// Seal `env` for `to` and send it on a background task. Relay traffic
    /// is fire-and-forget; failures are logged, never counted as votes.
    fn spawn_send(
        &self,
        to: PartyId,
        op: Operation,
        env: &BroadcastEnvelope,
    ) -> Result<(), CoordError> {
        let keys = self.keys_of(to)?;
        let sealed = self
            .channel
            .seal(to, &keys, &env.to_bytes(), self.clock.now())?;
        let request = WireRequest {
            op,
            envelope: sealed.envelope,
        };
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(err) = transport.request(to, request).await {
                tracing::warn!(peer = to, %err, "broadcast relay failed");
            }
        });
        Ok(())
    }

    fn fanout(&self, op: Operation, env: &BroadcastEnvelope) -> Result<(), CoordError> {
        for index in 0..self.config.replicas {
            self.spawn_send(replica_id(index), op, env)?;
        }
        Ok(())
    }

    async fn handle_broadcast(
        &self,
        op: Operation,
        sender: PartyId,
        plaintext: &[u8],
    ) -> Result<Reply, CoordError> {
        let env = BroadcastEnvelope::from_bytes(plaintext).map_err(|_| CoordError::MalformedBody)?;

        // Votes are attributable to replicas only
        if Role::of(sender) != Role::Replica {
            return Err(CoordError::Broadcast(BroadcastError::ForeignOrigin(
                env.id, sender,
            )));
        }

        let actions = match op {
            Operation::BcastSend => self.engine.on_send(&env)?,
            Operation::BcastEcho => self.engine.on_echo(sender, &env)?,
            Operation::BcastReady => self.engine.on_ready(sender, &env)?,
            Operation::BcastDeliver => {
                self.engine.on_deliver_ack(sender, &env)?;
                Vec::new()
            }
            _ => return Err(CoordError::MalformedBody),
        };

        for action in actions {
            let result = match action {
                Action::RelayEcho(value) => self.fanout(
                    Operation::BcastEcho,
                    &BroadcastEnvelope {
                        id: env.id,
                        nonce: self.clock.now(),
                        value,
                    },
                ),
                Action::RelayReady(value) => self.fanout(
                    Operation::BcastReady,
                    &BroadcastEnvelope {
                        id: env.id,
                        nonce: self.clock.now(),
                        value,
                    },
                ),
                Action::Deliver(value) => self.apply_delivery(env.id, value),
            };
            if let Err(err) = result {
                tracing::warn!(round = %env.id, %err, "broadcast action failed");
            }
        }

        Ok(Reply::BcastAck)
    }

    /// Apply a delivered value to the store and ack the round's originator
    fn apply_delivery(&self, id: BroadcastId, value: BroadcastValue) -> Result<(), CoordError> {
        let ack_value = match value {
            BroadcastValue::Write { report, write_ts } => {
                let user = report.user;
                let epoch = report.epoch;
                let applied_ts = self.store.put_lww(report, write_ts);
                tracing::debug!(round = %id, user, epoch, applied_ts, "write applied");
                BroadcastValue::WriteAck { applied_ts }
            }
            BroadcastValue::Read { user, epoch } => {
                let record = self.store.get(user, epoch).map(|mut record| {
                    // One bad witness must not poison evidence assembled
                    // from peer reads; drop unacceptable proofs silently
                    record.report.proofs = self
                        .validator
                        .filter_acceptable(&record.report, &self.directory);
                    record
                });
                BroadcastValue::ReadResult { record }
            }
            other => {
                tracing::warn!(round = %id, ?other, "undeliverable value kind");
                return Ok(());
            }
        };

        let ack = BroadcastEnvelope {
            id,
            nonce: self.clock.now(),
            value: ack_value,
        };
        // The deliver ack goes to the originator only, not a full broadcast
        self.spawn_send(id.origin, Operation::BcastDeliver, &ack)
    }

    // ------------------------------------------------------------------
    // Key exchange
    // ------------------------------------------------------------------

    fn handle_key_exchange(&self, sender: PartyId, plaintext: &[u8]) -> Result<Reply, CoordError> {
        // Opening the envelope already installed the offered key; the ack is
        // sealed under it, which is what proves installation to the sender
        let _offer = decode::<KeyOffer>(plaintext)?;
        if Role::of(sender) != Role::Replica {
            return Err(CoordError::Unauthorized(sender));
        }
        tracing::debug!(partner = sender, "session key installed");
        Ok(Reply::KeyAck)
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    async fn dispatch(
        &self,
        op: Operation,
        sender: PartyId,
        plaintext: &[u8],
    ) -> Result<Reply, CoordError> {
        match op {
            Operation::SubmitWrite => self.handle_submit(sender, plaintext).await,
            Operation::ObtainRead => self.handle_obtain(sender, plaintext).await,
            Operation::BcastSend
            | Operation::BcastEcho
            | Operation::BcastReady
            | Operation::BcastDeliver => self.handle_broadcast(op, sender, plaintext).await,
            Operation::KeyExchange | Operation::KeyRefresh => {
                self.handle_key_exchange(sender, plaintext)
            }
        }
    }

    fn seal_reply(&self, key: &SessionKey, reply: &Reply) -> WireResponse {
        let plaintext = borsh::to_vec(reply).expect("Reply serialization should not fail");
        match self.channel.seal_with(key, &plaintext) {
            Ok(envelope) => WireResponse { envelope },
            Err(err) => {
                tracing::error!(%err, "failed to seal reply");
                self.unsealed_failure()
            }
        }
    }

    /// Degenerate response for callers we cannot seal to. Receivers treat
    /// an empty envelope as a protocol failure.
    fn unsealed_failure(&self) -> WireResponse {
        WireResponse {
            envelope: SecureEnvelope {
                sender: self.id,
                wrapped_key: None,
                payload: Vec::new(),
                signature: Vec::new(),
            },
        }
    }
}

#[async_trait]
impl RequestHandler for Coordinator {
    async fn handle(&self, request: WireRequest) -> WireResponse {
        let sender = request.envelope.sender;
        let now = self.clock.now();

        let Some(sender_keys) = self.directory.get(sender).cloned() else {
            tracing::warn!(sender, "request from unprovisioned sender");
            return self.unsealed_failure();
        };

        let opened = match self.channel.open(&request.envelope, &sender_keys, now) {
            Ok(opened) => opened,
            Err(err) => {
                // Cryptographic failures are rejected per-message; the
                // rejection itself is sealed under a fresh wrap
                tracing::warn!(sender, op = ?request.op, %err, "envelope rejected");
                let code = CoordError::from(err).code();
                let body = borsh::to_vec(&Reply::Err(code))
                    .expect("Reply serialization should not fail");
                return match self.channel.seal(sender, &sender_keys, &body, now) {
                    Ok(sealed) => WireResponse {
                        envelope: sealed.envelope,
                    },
                    Err(seal_err) => {
                        tracing::error!(%seal_err, "failed to seal rejection");
                        self.unsealed_failure()
                    }
                };
            }
        };

        let reply = match self.dispatch(request.op, sender, &opened.plaintext).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::debug!(sender, op = ?request.op, %err, "request failed");
                Reply::Err(err.code())
            }
        };
        self.seal_reply(&opened.key, &reply)
    }
}

fn decode<T: borsh::BorshDeserialize>(bytes: &[u8]) -> Result<T, CoordError> {
    borsh::from_slice(bytes).map_err(|_| CoordError::MalformedBody)
}
