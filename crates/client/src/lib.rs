//! Client library for the geowitness cluster
//!
//! A [`Client`] seals submit/obtain requests for its home replica, opens the
//! sealed reply, and maps wire error codes to typed errors. Each exchange
//! uses a fresh one-shot session key; the reply rides back under the same
//! key (or under a fresh wrap when the replica rejected the request before
//! opening it).

use std::sync::Arc;

use thiserror::Error;

use geowitness_crypto::{CryptoError, KeyRing, PartyKeypair, SecureChannel};
use geowitness_replica::{Transport, TransportError};
use geowitness_types::{
    replica_id, ClientRequest, Epoch, ErrorCode, LocationReport, LogicalClock, Operation, PartyId,
    Reply, StoredRecord, Tick, WireRequest,
};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("replica rejected the request: {0}")]
    Rejected(ErrorCode),

    #[error("replica reply was malformed")]
    Protocol,

    #[error("party {0} is not provisioned in the key directory")]
    UnknownParty(PartyId),
}

/// One user's handle on the cluster, homed on a single replica
pub struct Client {
    id: PartyId,
    home: PartyId,
    channel: SecureChannel,
    directory: KeyRing,
    clock: LogicalClock,
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn new(
        id: PartyId,
        keypair: PartyKeypair,
        directory: KeyRing,
        home_index: usize,
        session_validity_ticks: u64,
        clock: LogicalClock,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            id,
            home: replica_id(home_index),
            channel: SecureChannel::new(id, keypair, session_validity_ticks),
            directory,
            clock,
            transport,
        }
    }

    pub fn id(&self) -> PartyId {
        self.id
    }

    async fn call(&self, op: Operation, body: &ClientRequest) -> Result<Reply, ClientError> {
        let home_keys = self
            .directory
            .get(self.home)
            .cloned()
            .ok_or(ClientError::UnknownParty(self.home))?;

        let plaintext = borsh::to_vec(body).expect("ClientRequest serialization should not fail");
        let now = self.clock.now();
        let sealed = self.channel.seal(self.home, &home_keys, &plaintext, now)?;
        let request = WireRequest {
            op,
            envelope: sealed.envelope,
        };

        let response = self.transport.request(self.home, request).await?;
        if response.envelope.payload.is_empty() {
            // The replica could not seal a reply to us at all
            tracing::warn!(home = self.home, "unsealable reply from home replica");
            return Err(ClientError::Protocol);
        }

        let reply_bytes = if response.envelope.wrapped_key.is_some() {
            self.channel
                .open(&response.envelope, &home_keys, self.clock.now())?
                .plaintext
        } else {
            self.channel
                .open_reply(&response.envelope, &home_keys, &sealed.key)?
        };
        borsh::from_slice(&reply_bytes).map_err(|_| ClientError::Protocol)
    }

    /// Submit a witnessed location report. Returns the timestamp the
    /// cluster applied the write at.
    pub async fn submit(&self, report: LocationReport) -> Result<Tick, ClientError> {
        let reply = self
            .call(Operation::SubmitWrite, &ClientRequest::Submit { report })
            .await?;
        match reply {
            Reply::SubmitOk { applied_ts } => Ok(applied_ts),
            Reply::Err(code) => Err(ClientError::Rejected(code)),
            _ => Err(ClientError::Protocol),
        }
    }

    /// Fetch the report stored for `(user, epoch)`, if any. Ordinary
    /// clients may only read their own history; the health authority may
    /// read anyone's.
    pub async fn obtain(
        &self,
        user: PartyId,
        epoch: Epoch,
    ) -> Result<Option<StoredRecord>, ClientError> {
        let reply = self
            .call(Operation::ObtainRead, &ClientRequest::Obtain { user, epoch })
            .await?;
        match reply {
            Reply::Record { record } => Ok(record),
            Reply::Err(code) => Err(ClientError::Rejected(code)),
            _ => Err(ClientError::Protocol),
        }
    }
}
