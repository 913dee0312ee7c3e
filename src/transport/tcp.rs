//! TCP simulation of the radio link, for development without BlueZ

use crate::transport::traits::{ListeningEndpoint, ServiceRecord, Transport};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use restodash_shared::PeerIdentity;
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// Listening endpoint over a TCP listener
pub struct TcpEndpoint {
    inner: TcpListener,
}

impl TcpEndpoint {
    /// Local address the endpoint is bound to
    pub fn local_addr(&self) -> Result<String> {
        Ok(self.inner.local_addr()?.to_string())
    }
}

#[async_trait]
impl ListeningEndpoint for TcpEndpoint {
    type Stream = TcpStream;

    async fn accept(&mut self) -> Result<(TcpStream, PeerIdentity)> {
        let (stream, addr) = self.inner.accept().await?;
        Ok((stream, PeerIdentity::unnamed(addr.to_string())))
    }
}

/// TCP transport. Peers are addressed by socket address.
pub struct TcpTransport {
    listen_address: String,
}

impl TcpTransport {
    /// Create a transport that listens on `listen_address`
    pub fn new(listen_address: impl Into<String>) -> Self {
        Self {
            listen_address: listen_address.into(),
        }
    }

    pub fn listen_address(&self) -> &str {
        &self.listen_address
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Stream = TcpStream;
    type Endpoint = TcpEndpoint;

    async fn bind(&self, service: &ServiceRecord) -> Result<TcpEndpoint> {
        let listener = TcpListener::bind(&self.listen_address)
            .await
            .map_err(|e| anyhow!("TCP bind on {} failed: {}", self.listen_address, e))?;
        let endpoint = TcpEndpoint { inner: listener };
        debug!(
            "[TCP] Simulating service '{}' ({}, channel {}) on {}",
            service.name,
            service.uuid,
            service.channel,
            endpoint.local_addr()?
        );
        Ok(endpoint)
    }

    async fn dial(&self, peer: &PeerIdentity, _service: &ServiceRecord) -> Result<TcpStream> {
        let stream = TcpStream::connect(&peer.address).await?;
        Ok(stream)
    }

    fn cancel_discovery(&self) {
        // TCP peers are addressed directly; there is no discovery to cancel
    }

    fn name(&self) -> &'static str {
        "TCP simulation"
    }
}
