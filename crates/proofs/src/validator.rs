//! The proof validation engine

use std::collections::HashSet;

use thiserror::Error;

use geowitness_crypto::{verify_message, KeyRing};
use geowitness_types::{LocationProof, LocationReport, PartyId, ProofOutcome};

/// Why a single proof was rejected
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofRejection {
    #[error("witness is the report's own subject")]
    SelfWitnessed,

    #[error("proof attests for a different user than the report's subject")]
    WrongProver,

    #[error("witness already corroborated this report")]
    DuplicateWitness,

    #[error("proof epoch differs from the report epoch")]
    EpochMismatch,

    #[error("witness position is outside the detection range")]
    OutOfRange,

    #[error("witness reported a failed exchange")]
    FailureOutcome,

    #[error("witness is not provisioned in the key directory")]
    UnknownWitness,

    #[error("witness signature does not verify")]
    BadSignature,
}

/// Validation failure for a whole report
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("report carries no witness proofs")]
    NoProofs,

    #[error("proof from witness {witness} rejected: {reason}")]
    Unacceptable {
        witness: PartyId,
        reason: ProofRejection,
    },
}

/// Applies the acceptance rules to a report's witness proofs
#[derive(Debug, Clone, Copy)]
pub struct ProofValidator {
    detection_range: f64,
}

impl ProofValidator {
    pub fn new(detection_range: f64) -> Self {
        Self { detection_range }
    }

    /// The per-proof acceptance predicate. `seen` holds witnesses already
    /// accepted earlier in this report's proof list.
    fn check(
        &self,
        report: &LocationReport,
        proof: &LocationProof,
        seen: &HashSet<PartyId>,
        directory: &KeyRing,
    ) -> Result<(), ProofRejection> {
        let body = &proof.body;
        if body.witness == report.user {
            return Err(ProofRejection::SelfWitnessed);
        }
        if body.prover != report.user {
            return Err(ProofRejection::WrongProver);
        }
        if seen.contains(&body.witness) {
            return Err(ProofRejection::DuplicateWitness);
        }
        if body.epoch != report.epoch {
            return Err(ProofRejection::EpochMismatch);
        }
        if body.outcome != ProofOutcome::Success {
            return Err(ProofRejection::FailureOutcome);
        }
        if report.position.distance(&body.position) > self.detection_range {
            return Err(ProofRejection::OutOfRange);
        }
        let witness_keys = directory
            .get(body.witness)
            .ok_or(ProofRejection::UnknownWitness)?;
        verify_message(&witness_keys.sign, &body.to_bytes(), &proof.signature)
            .map_err(|_| ProofRejection::BadSignature)?;
        Ok(())
    }

    /// Strict mode: the first unacceptable proof aborts the validation.
    /// Used when accepting a client-submitted report; no partial acceptance.
    pub fn verify_all(
        &self,
        report: &LocationReport,
        directory: &KeyRing,
    ) -> Result<(), ValidationError> {
        if report.proofs.is_empty() {
            return Err(ValidationError::NoProofs);
        }
        let mut seen = HashSet::new();
        for proof in &report.proofs {
            self.check(report, proof, &seen, directory)
                .map_err(|reason| ValidationError::Unacceptable {
                    witness: proof.body.witness,
                    reason,
                })?;
            seen.insert(proof.body.witness);
        }
        Ok(())
    }

    /// Tolerant mode: drop unacceptable proofs and keep the rest. Used when
    /// compiling evidence gathered from peer reads, where one bad witness
    /// must not poison the assembled set.
    pub fn filter_acceptable(
        &self,
        report: &LocationReport,
        directory: &KeyRing,
    ) -> Vec<LocationProof> {
        let mut seen = HashSet::new();
        let mut accepted = Vec::with_capacity(report.proofs.len());
        for proof in &report.proofs {
            match self.check(report, proof, &seen, directory) {
                Ok(()) => {
                    seen.insert(proof.body.witness);
                    accepted.push(proof.clone());
                }
                Err(reason) => {
                    tracing::debug!(
                        user = report.user,
                        epoch = report.epoch,
                        witness = proof.body.witness,
                        %reason,
                        "dropping unacceptable proof"
                    );
                }
            }
        }
        accepted
    }
}
