//! Broadcast layer errors

use geowitness_types::{BroadcastId, PartyId};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("stale nonce for round {0}")]
    StaleMessage(BroadcastId),

    #[error("round {0} was originated by non-replica id {1}")]
    ForeignOrigin(BroadcastId, PartyId),

    #[error("round {0} already has a registered originator")]
    AlreadyOriginated(BroadcastId),

    #[error("round {0} timed out before reaching its ack quorum")]
    Timeout(BroadcastId),
}
