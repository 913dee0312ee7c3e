//! Transport trait abstraction for pluggable link backends

use anyhow::Result;
use async_trait::async_trait;
use restodash_shared::PeerIdentity;
use tokio::io::{AsyncRead, AsyncWrite};

/// A connected byte stream. Dropping it closes the socket.
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<S> TransportStream for S where S: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Service identity a listening endpoint is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Name published in the service record
    pub name: String,
    /// Service UUID
    pub uuid: String,
    /// RFCOMM channel
    pub channel: u8,
}

/// A bound endpoint accepting inbound sockets. Dropping it closes the endpoint.
#[async_trait]
pub trait ListeningEndpoint: Send + 'static {
    type Stream: TransportStream;

    /// Wait for the next inbound socket
    async fn accept(&mut self) -> Result<(Self::Stream, PeerIdentity)>;
}

/// Factory for listening endpoints and outbound sockets
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The stream type this transport produces
    type Stream: TransportStream;

    /// The listening endpoint type this transport binds
    type Endpoint: ListeningEndpoint<Stream = Self::Stream>;

    /// Create a listening endpoint for the service
    async fn bind(&self, service: &ServiceRecord) -> Result<Self::Endpoint>;

    /// Open an outbound stream to `peer`
    async fn dial(&self, peer: &PeerIdentity, service: &ServiceRecord) -> Result<Self::Stream>;

    /// Stop any device discovery in progress
    fn cancel_discovery(&self);

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
