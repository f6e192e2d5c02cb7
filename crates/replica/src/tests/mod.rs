//! End-to-end cluster test harness
//!
//! Builds a whole cluster in-process: key material for every party, one
//! coordinator per replica wired over [`LocalCluster`], and a lightweight
//! test client that seals requests the way a real front end would.

mod cluster_test;

use std::collections::HashMap;
use std::sync::Arc;

use geowitness_crypto::{
    directory_of, generate_cluster_keys, sign_message, KeyRing, PartyKeypair, SecureChannel,
};
use geowitness_types::{
    replica_id, BroadcastEnvelope, BroadcastId, BroadcastValue, ClientRequest, Epoch,
    LocationProof, LocationReport, LogicalClock, Operation, PartyId, Position, ProofBody,
    ProofOutcome, Reply, Tick, WireRequest,
};

use crate::config::ReplicaConfig;
use crate::coordinator::Coordinator;
use crate::transport::{LocalCluster, Transport};

pub(crate) struct TestCluster {
    pub transport: Arc<LocalCluster>,
    pub coordinators: Vec<Arc<Coordinator>>,
    pub keys: HashMap<PartyId, PartyKeypair>,
    pub directory: KeyRing,
    pub clock: LogicalClock,
    pub config: ReplicaConfig,
}

/// A cluster with every replica registered on the transport
pub(crate) fn build_cluster(replicas: usize, client_ids: &[PartyId]) -> TestCluster {
    build_partial_cluster(replicas, replicas, client_ids, 2_000)
}

/// A cluster of `replicas` provisioned replicas of which only the first
/// `live` answer requests; the rest behave like crashed members
pub(crate) fn build_partial_cluster(
    replicas: usize,
    live: usize,
    client_ids: &[PartyId],
    round_timeout_ms: u64,
) -> TestCluster {
    let keys = generate_cluster_keys(client_ids, replicas);
    let directory = directory_of(&keys);
    let transport = Arc::new(LocalCluster::new());
    let clock = LogicalClock::starting_at(1);
    let config = ReplicaConfig {
        replicas,
        round_timeout_ms,
        ..Default::default()
    };

    let mut coordinators = Vec::with_capacity(live);
    for index in 0..live {
        let keypair = keys[&replica_id(index)].clone();
        let coordinator = Coordinator::new(
            index,
            keypair,
            directory.clone(),
            config.clone(),
            clock.clone(),
            transport.clone() as Arc<dyn Transport>,
        );
        transport.register(replica_id(index), coordinator.clone());
        coordinators.push(coordinator);
    }

    TestCluster {
        transport,
        coordinators,
        keys,
        directory,
        clock,
        config,
    }
}

impl TestCluster {
    /// A client (or the authority) homed on replica 0
    pub fn client(&self, id: PartyId) -> TestClient {
        TestClient {
            id,
            home: replica_id(0),
            channel: SecureChannel::new(
                id,
                self.keys[&id].clone(),
                self.config.session_validity_ticks,
            ),
            directory: self.directory.clone(),
            clock: self.clock.clone(),
            transport: self.transport.clone(),
        }
    }

    /// A witness-signed proximity proof
    pub fn signed_proof(
        &self,
        witness: PartyId,
        prover: PartyId,
        position: Position,
        epoch: Epoch,
        outcome: ProofOutcome,
    ) -> LocationProof {
        let body = ProofBody {
            position,
            prover,
            witness,
            epoch,
            outcome,
        };
        let signature = sign_message(&self.keys[&witness].signing, &body.to_bytes());
        LocationProof { body, signature }
    }
}

/// Push a write round into the cluster from a (possibly crashed) replica
/// identity, delivering SEND to every live replica
pub(crate) async fn drive_write_round(
    cluster: &TestCluster,
    origin_index: usize,
    seq: u64,
    report: LocationReport,
    write_ts: Tick,
) {
    let origin = replica_id(origin_index);
    // A fresh channel per round so every SEND carries its own wrapped key
    let channel = SecureChannel::new(
        origin,
        cluster.keys[&origin].clone(),
        cluster.config.session_validity_ticks,
    );
    let env = BroadcastEnvelope {
        id: BroadcastId { origin, seq },
        nonce: cluster.clock.now(),
        value: BroadcastValue::Write { report, write_ts },
    };
    for coordinator in &cluster.coordinators {
        let to = coordinator.id();
        let keys = cluster.directory.get(to).unwrap().clone();
        let sealed = channel
            .seal(to, &keys, &env.to_bytes(), cluster.clock.now())
            .unwrap();
        cluster
            .transport
            .request(
                to,
                WireRequest {
                    op: Operation::BcastSend,
                    envelope: sealed.envelope,
                },
            )
            .await
            .unwrap();
    }
}

pub(crate) struct TestClient {
    id: PartyId,
    home: PartyId,
    channel: SecureChannel,
    directory: KeyRing,
    clock: LogicalClock,
    transport: Arc<LocalCluster>,
}

impl TestClient {
    async fn call(&self, op: Operation, body: &ClientRequest) -> Reply {
        let home_keys = self.directory.get(self.home).unwrap().clone();
        let plaintext = borsh::to_vec(body).unwrap();
        let sealed = self
            .channel
            .seal(self.home, &home_keys, &plaintext, self.clock.now())
            .unwrap();
        let request = WireRequest {
            op,
            envelope: sealed.envelope,
        };
        let response = self.transport.request(self.home, request).await.unwrap();

        // Replies to a one-shot request ride under the request's key; a
        // rejection of an unopenable envelope arrives under a fresh wrap
        let reply_bytes = if response.envelope.wrapped_key.is_some() {
            self.channel
                .open(&response.envelope, &home_keys, self.clock.now())
                .unwrap()
                .plaintext
        } else {
            self.channel
                .open_reply(&response.envelope, &home_keys, &sealed.key)
                .unwrap()
        };
        borsh::from_slice(&reply_bytes).unwrap()
    }

    pub async fn submit(&self, report: LocationReport) -> Reply {
        assert_eq!(report.user, self.id, "test client submits its own reports");
        self.call(Operation::SubmitWrite, &ClientRequest::Submit { report })
            .await
    }

    pub async fn submit_for(&self, report: LocationReport) -> Reply {
        self.call(Operation::SubmitWrite, &ClientRequest::Submit { report })
            .await
    }

    pub async fn obtain(&self, user: PartyId, epoch: Epoch) -> Reply {
        self.call(Operation::ObtainRead, &ClientRequest::Obtain { user, epoch })
            .await
    }
}
