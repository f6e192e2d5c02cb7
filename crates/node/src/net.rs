//! WebSocket transport between replicas and their callers
//!
//! Each request opens a short-lived connection to the target replica,
//! ships one borsh-encoded [`WireRequest`] as a binary frame, and waits for
//! the single [`WireResponse`] frame. The server side accepts connections,
//! answers frames through the coordinator, and closes when the peer does.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, connect_async, tungstenite::Message};

use geowitness_replica::{RequestHandler, Transport, TransportError};
use geowitness_types::{PartyId, WireRequest, WireResponse};

/// Outbound side: resolves replica ids to well-known addresses
pub struct WsTransport {
    peers: HashMap<PartyId, String>,
}

impl WsTransport {
    pub fn new(peers: HashMap<PartyId, String>) -> Self {
        Self { peers }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn request(
        &self,
        to: PartyId,
        request: WireRequest,
    ) -> Result<WireResponse, TransportError> {
        let addr = self.peers.get(&to).ok_or(TransportError::Unroutable(to))?;
        let url = format!("ws://{addr}");
        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let (mut sender, mut receiver) = ws_stream.split();

        sender
            .send(Message::Binary(request.to_bytes()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;

        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Binary(data)) => {
                    return WireResponse::from_bytes(&data)
                        .map_err(|e| TransportError::Io(e.to_string()));
                }
                Ok(Message::Close(_)) => break,
                Err(e) => return Err(TransportError::Io(e.to_string())),
                _ => {}
            }
        }
        Err(TransportError::Io("connection closed before reply".into()))
    }
}

/// Start the replica's listener; connections are served on background tasks
pub async fn start(addr: &str, handler: Arc<dyn RequestHandler>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Replica listening on {}", addr);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    tracing::debug!("Connection from {}", peer_addr);
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, handler).await {
                            tracing::warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                }
            }
        }
    });

    Ok(())
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    handler: Arc<dyn RequestHandler>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut sender, mut receiver) = ws_stream.split();

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Binary(data)) => {
                let request = match WireRequest::from_bytes(&data) {
                    Ok(request) => request,
                    Err(e) => {
                        tracing::warn!("Dropping malformed frame: {}", e);
                        continue;
                    }
                };
                let response = handler.handle(request).await;
                if sender
                    .send(Message::Binary(response.to_bytes()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    Ok(())
}
