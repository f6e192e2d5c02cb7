//! Coordinator errors and their wire codes

use thiserror::Error;

use geowitness_consensus::BroadcastError;
use geowitness_crypto::CryptoError;
use geowitness_proofs::ValidationError;
use geowitness_types::{Epoch, ErrorCode, PartyId};

use crate::transport::TransportError;

/// Everything that can fail while a coordinator handles a request
#[derive(Error, Debug)]
pub enum CoordError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("sender {0} is not authorized for this request")]
    Unauthorized(PartyId),

    #[error("a report already exists for user {0} at epoch {1}")]
    RecordConflict(PartyId, Epoch),

    #[error("party {0} is not provisioned in the key directory")]
    UnknownParty(PartyId),

    #[error("request body could not be decoded")]
    MalformedBody,
}

impl CoordError {
    /// The wire code this failure is reported as
    pub fn code(&self) -> ErrorCode {
        match self {
            CoordError::Crypto(CryptoError::SignatureInvalid) => ErrorCode::SignatureInvalid,
            CoordError::Crypto(_) => ErrorCode::DecryptionFailed,
            CoordError::Broadcast(BroadcastError::StaleMessage(_)) => ErrorCode::StaleMessage,
            CoordError::Broadcast(BroadcastError::ForeignOrigin(_, _)) => ErrorCode::ForeignOrigin,
            CoordError::Broadcast(BroadcastError::Timeout(_)) => ErrorCode::BroadcastTimeout,
            CoordError::Broadcast(BroadcastError::AlreadyOriginated(_)) => ErrorCode::Internal,
            CoordError::Validation(_) => ErrorCode::RecordNotAcceptable,
            CoordError::Unauthorized(_) | CoordError::UnknownParty(_) => ErrorCode::Unauthorized,
            CoordError::RecordConflict(_, _) => ErrorCode::RecordConflict,
            CoordError::Transport(_) | CoordError::MalformedBody => ErrorCode::Internal,
        }
    }
}
