//! Location reports and witness proofs

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::clock::{Epoch, Tick};
use crate::identity::PartyId;

/// A position on the simulated grid
#[derive(Debug, Clone, Copy, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position
    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Outcome a witness attests to for a proximity exchange
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum ProofOutcome {
    /// The witness observed the prover within range
    Success,
    /// The exchange failed; cannot corroborate a report
    Failure,
}

/// The signed portion of a witness proof
#[derive(Debug, Clone, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ProofBody {
    /// Where the witness observed the exchange
    pub position: Position,
    /// The user being attested for
    pub prover: PartyId,
    /// The user attesting
    pub witness: PartyId,
    /// Epoch the exchange happened in
    pub epoch: Epoch,
    pub outcome: ProofOutcome,
}

impl ProofBody {
    /// Canonical bytes the witness signs
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("ProofBody serialization should not fail")
    }
}

/// A witness-signed proximity corroboration
#[derive(Debug, Clone, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct LocationProof {
    pub body: ProofBody,
    /// Witness ed25519 signature over the body bytes
    pub signature: Vec<u8>,
}

/// A user's claimed location for one epoch, with witness corroborations
#[derive(Debug, Clone, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct LocationReport {
    pub user: PartyId,
    pub epoch: Epoch,
    pub position: Position,
    /// Ordered witness proofs; order decides first-seen-wins deduplication
    pub proofs: Vec<LocationProof>,
}

impl LocationReport {
    /// Key this report is stored under
    pub fn key(&self) -> (PartyId, Epoch) {
        (self.user, self.epoch)
    }
}

/// An accepted report together with its write timestamp
#[derive(Debug, Clone, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct StoredRecord {
    pub report: LocationReport,
    /// Logical tick of the write that produced this record
    pub write_ts: Tick,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Position::new(1.0, 1.0);
        let b = Position::new(1.0, 3.0);
        assert_eq!(a.distance(&b), 2.0);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_proof_body_bytes_are_canonical() {
        let body = ProofBody {
            position: Position::new(2.0, 2.0),
            prover: 1,
            witness: 2,
            epoch: 5,
            outcome: ProofOutcome::Success,
        };
        assert_eq!(body.to_bytes(), body.clone().to_bytes());
    }
}
