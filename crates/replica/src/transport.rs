//! Cluster transport abstraction
//!
//! The routing framework is assumed to deliver point-to-point
//! request/response messages reliably, but neither confidentially nor in
//! order; confidentiality and authentication live in the envelope layer.
//! [`LocalCluster`] wires a whole cluster in-process for tests and
//! simulation; the node binary provides a socket-backed implementation.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use geowitness_types::{PartyId, WireRequest, WireResponse};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("no route to party {0}")]
    Unroutable(PartyId),

    #[error("transport I/O failure: {0}")]
    Io(String),
}

/// Point-to-point request/response messaging to fixed per-party endpoints
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        to: PartyId,
        request: WireRequest,
    ) -> Result<WireResponse, TransportError>;
}

/// Server side of the transport: answers one wire request
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: WireRequest) -> WireResponse;
}

/// In-process cluster: requests go straight to the registered handler.
/// Deregistering a handler simulates a crashed replica.
#[derive(Clone, Default)]
pub struct LocalCluster {
    handlers: Arc<DashMap<PartyId, Arc<dyn RequestHandler>>>,
}

impl LocalCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: PartyId, handler: Arc<dyn RequestHandler>) {
        self.handlers.insert(id, handler);
    }

    pub fn deregister(&self, id: PartyId) {
        self.handlers.remove(&id);
    }
}

#[async_trait]
impl Transport for LocalCluster {
    async fn request(
        &self,
        to: PartyId,
        request: WireRequest,
    ) -> Result<WireResponse, TransportError> {
        let handler = self
            .handlers
            .get(&to)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(TransportError::Unroutable(to))?;
        Ok(handler.handle(request).await)
    }
}
