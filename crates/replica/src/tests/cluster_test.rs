//! End-to-end cluster behavior
//!
//! Drives whole submit/obtain flows through sealed envelopes, the broadcast
//! protocol, and the record store, over an in-process four-replica cluster
//! (five, with one crashed member, for the adversarial cases).

use std::time::Duration;

use tokio::time::sleep;

use crate::transport::Transport;

use geowitness_crypto::sign_message;
use geowitness_types::{
    replica_id, BroadcastEnvelope, BroadcastId, BroadcastValue, ErrorCode, LocationProof,
    LocationReport, Operation, PartyId, Position, ProofBody, ProofOutcome, Reply, WireRequest,
    AUTHORITY_ID,
};

use super::{build_cluster, build_partial_cluster, drive_write_round, TestCluster};

const SETTLE: Duration = Duration::from_millis(300);

fn witnessed_report(cluster: &TestCluster, user: PartyId, epoch: u64) -> LocationReport {
    let position = Position::new(1.0, 1.0);
    LocationReport {
        user,
        epoch,
        position,
        proofs: vec![
            cluster.signed_proof(2, user, Position::new(1.0, 2.0), epoch, ProofOutcome::Success),
            cluster.signed_proof(3, user, Position::new(2.0, 1.0), epoch, ProofOutcome::Success),
        ],
    }
}

#[tokio::test]
async fn test_submit_then_obtain_round_trip() {
    let cluster = build_cluster(4, &[1, 2, 3]);
    let client = cluster.client(1);
    let report = witnessed_report(&cluster, 1, 5);

    let reply = client.submit(report.clone()).await;
    assert!(matches!(reply, Reply::SubmitOk { .. }), "got {reply:?}");

    let reply = client.obtain(1, 5).await;
    let Reply::Record {
        record: Some(record),
    } = reply
    else {
        panic!("expected a record, got {reply:?}");
    };
    assert_eq!(record.report.position, report.position);
    assert_eq!(record.report.proofs, report.proofs);
}

#[tokio::test]
async fn test_single_bad_proof_rejects_whole_submission() {
    let cluster = build_cluster(4, &[1, 2, 3, 4]);
    let client = cluster.client(1);

    let mut report = witnessed_report(&cluster, 1, 5);
    // One witness far outside the detection range poisons the submission
    report.proofs.push(cluster.signed_proof(
        4,
        1,
        Position::new(9.0, 9.0),
        5,
        ProofOutcome::Success,
    ));

    let reply = client.submit(report).await;
    assert_eq!(reply, Reply::Err(ErrorCode::RecordNotAcceptable));

    // Nothing was persisted anywhere
    let reply = client.obtain(1, 5).await;
    assert_eq!(reply, Reply::Record { record: None });
    for coordinator in &cluster.coordinators {
        assert!(!coordinator.store().exists(1, 5));
    }
}

#[tokio::test]
async fn test_duplicate_submission_is_rejected() {
    let cluster = build_cluster(4, &[1, 2, 3]);
    let client = cluster.client(1);

    let first = witnessed_report(&cluster, 1, 5);
    assert!(matches!(
        client.submit(first.clone()).await,
        Reply::SubmitOk { .. }
    ));
    sleep(SETTLE).await;

    // Same (user, epoch), different content
    let mut second = witnessed_report(&cluster, 1, 5);
    second.position = Position::new(2.0, 2.0);
    second.proofs = vec![
        cluster.signed_proof(2, 1, Position::new(2.0, 3.0), 5, ProofOutcome::Success),
        cluster.signed_proof(3, 1, Position::new(3.0, 2.0), 5, ProofOutcome::Success),
    ];
    let reply = client.submit(second).await;
    assert_eq!(reply, Reply::Err(ErrorCode::RecordConflict));

    // The store retains only the first report
    let reply = client.obtain(1, 5).await;
    let Reply::Record {
        record: Some(record),
    } = reply
    else {
        panic!("expected the first report to survive");
    };
    assert_eq!(record.report.position, first.position);
}

#[tokio::test]
async fn test_liveness_every_replica_delivers() {
    let cluster = build_cluster(4, &[1, 2, 3]);
    let client = cluster.client(1);

    let reply = client.submit(witnessed_report(&cluster, 1, 7)).await;
    assert!(matches!(reply, Reply::SubmitOk { .. }));

    // The submit waits for the ack quorum; the rest of the cluster settles
    // moments later
    sleep(SETTLE).await;
    for coordinator in &cluster.coordinators {
        assert!(
            coordinator.store().exists(1, 7),
            "replica {} missed the delivery",
            coordinator.id()
        );
    }
}

#[tokio::test]
async fn test_submit_for_another_user_is_unauthorized() {
    let cluster = build_cluster(4, &[1, 2, 3]);
    let impostor = cluster.client(2);

    let reply = impostor.submit_for(witnessed_report(&cluster, 1, 5)).await;
    assert_eq!(reply, Reply::Err(ErrorCode::Unauthorized));
}

#[tokio::test]
async fn test_client_cannot_obtain_another_users_record() {
    let cluster = build_cluster(4, &[1, 2, 3]);
    let client = cluster.client(1);
    assert!(matches!(
        client.submit(witnessed_report(&cluster, 1, 5)).await,
        Reply::SubmitOk { .. }
    ));

    let snoop = cluster.client(2);
    assert_eq!(
        snoop.obtain(1, 5).await,
        Reply::Err(ErrorCode::Unauthorized)
    );
}

#[tokio::test]
async fn test_authority_can_obtain_any_record() {
    let cluster = build_cluster(4, &[1, 2, 3]);
    let client = cluster.client(1);
    assert!(matches!(
        client.submit(witnessed_report(&cluster, 1, 5)).await,
        Reply::SubmitOk { .. }
    ));

    let authority = cluster.client(AUTHORITY_ID);
    let reply = authority.obtain(1, 5).await;
    assert!(
        matches!(reply, Reply::Record { record: Some(_) }),
        "got {reply:?}"
    );
}

#[tokio::test]
async fn test_broadcast_timeout_when_quorum_unreachable() {
    let cluster = build_partial_cluster(4, 4, &[1, 2, 3], 500);
    let client = cluster.client(1);

    // A healthy round first, so every replica pair holds a live session key
    assert!(matches!(
        client.submit(witnessed_report(&cluster, 1, 1)).await,
        Reply::SubmitOk { .. }
    ));

    // Crash half the cluster: the echo quorum of 3 is out of reach
    cluster.transport.deregister(replica_id(2));
    cluster.transport.deregister(replica_id(3));

    let reply = client.submit(witnessed_report(&cluster, 1, 2)).await;
    assert_eq!(reply, Reply::Err(ErrorCode::BroadcastTimeout));
}

#[tokio::test]
async fn test_last_writer_wins_regardless_of_arrival_order() {
    // Five provisioned replicas, four live; the fifth identity originates
    let cluster = build_partial_cluster(5, 4, &[1], 2_000);

    let newer = LocationReport {
        user: 1,
        epoch: 9,
        position: Position::new(5.0, 5.0),
        proofs: vec![],
    };
    let older = LocationReport {
        user: 1,
        epoch: 9,
        position: Position::new(3.0, 3.0),
        proofs: vec![],
    };

    // The newer write arrives first, the older one trails it
    drive_write_round(&cluster, 4, 1, newer.clone(), 50).await;
    sleep(SETTLE).await;
    drive_write_round(&cluster, 4, 2, older, 10).await;
    sleep(SETTLE).await;

    for coordinator in &cluster.coordinators {
        let record = coordinator.store().get(1, 9).unwrap();
        assert_eq!(record.write_ts, 50);
        assert_eq!(record.report.position, newer.position);
    }
}

#[tokio::test]
async fn test_conflicting_values_are_never_delivered() {
    let cluster = build_partial_cluster(5, 4, &[1], 2_000);
    let origin = replica_id(4);

    let value_a = BroadcastValue::Write {
        report: LocationReport {
            user: 1,
            epoch: 3,
            position: Position::new(1.0, 1.0),
            proofs: vec![],
        },
        write_ts: 10,
    };
    let value_b = BroadcastValue::Write {
        report: LocationReport {
            user: 1,
            epoch: 3,
            position: Position::new(8.0, 8.0),
            proofs: vec![],
        },
        write_ts: 10,
    };

    // A faulty sender equivocates: half the cluster sees each value under
    // the same broadcast id
    let channel = geowitness_crypto::SecureChannel::new(
        origin,
        cluster.keys[&origin].clone(),
        cluster.config.session_validity_ticks,
    );
    for (index, value) in [(0usize, &value_a), (1, &value_a), (2, &value_b), (3, &value_b)] {
        let to = replica_id(index);
        let env = BroadcastEnvelope {
            id: BroadcastId { origin, seq: 1 },
            nonce: cluster.clock.now(),
            value: value.clone(),
        };
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

    // Neither value can gather the echo quorum of 3; nothing is delivered
    sleep(SETTLE).await;
    for coordinator in &cluster.coordinators {
        assert!(
            !coordinator.store().exists(1, 3),
            "replica {} delivered a conflicting value",
            coordinator.id()
        );
    }
}

#[tokio::test]
async fn test_read_reconciliation_prefers_newest_write() {
    let cluster = build_partial_cluster(5, 4, &[1], 2_000);

    let stale = LocationReport {
        user: 1,
        epoch: 4,
        position: Position::new(1.0, 1.0),
        proofs: vec![],
    };
    drive_write_round(&cluster, 4, 1, stale, 50).await;
    sleep(SETTLE).await;

    // Three replicas observed a newer concurrent write that replica 0 missed
    let newer = LocationReport {
        user: 1,
        epoch: 4,
        position: Position::new(6.0, 6.0),
        proofs: vec![],
    };
    for coordinator in &cluster.coordinators[1..] {
        coordinator.store().put_lww(newer.clone(), 80);
    }

    // Any ack quorum contains a majority holding the newer record
    let client = cluster.client(1);
    let reply = client.obtain(1, 4).await;
    let Reply::Record {
        record: Some(record),
    } = reply
    else {
        panic!("expected a record, got {reply:?}");
    };
    assert_eq!(record.write_ts, 80);
    assert_eq!(record.report.position, newer.position);
}

#[tokio::test]
async fn test_read_path_filters_unacceptable_proofs() {
    let cluster = build_cluster(4, &[1, 2, 3]);

    let good = cluster.signed_proof(2, 1, Position::new(1.0, 2.0), 6, ProofOutcome::Success);
    // Claimed witness 3, but signed by witness 2's key
    let forged_body = ProofBody {
        position: Position::new(2.0, 1.0),
        prover: 1,
        witness: 3,
        epoch: 6,
        outcome: ProofOutcome::Success,
    };
    let forged = LocationProof {
        signature: sign_message(&cluster.keys[&2].signing, &forged_body.to_bytes()),
        body: forged_body,
    };

    let tainted = LocationReport {
        user: 1,
        epoch: 6,
        position: Position::new(1.0, 1.0),
        proofs: vec![good.clone(), forged],
    };
    for coordinator in &cluster.coordinators {
        coordinator.store().put_lww(tainted.clone(), 10);
    }

    // The forged proof is dropped from the assembled evidence; the read
    // itself still succeeds
    let client = cluster.client(1);
    let reply = client.obtain(1, 6).await;
    let Reply::Record {
        record: Some(record),
    } = reply
    else {
        panic!("expected a record, got {reply:?}");
    };
    assert_eq!(record.report.proofs, vec![good]);
}
