//! In-process transport driven by tests
//!
//! Sockets are `tokio::io::duplex` pairs: the manager gets one end, the test
//! keeps the other and sees it close when the manager drops its side.

use crate::transport::traits::{ListeningEndpoint, ServiceRecord, Transport};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use restodash_shared::PeerIdentity;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::io::{duplex, DuplexStream};
use tokio::sync::{mpsc, oneshot};

const PIPE_CAPACITY: usize = 4096;

type Inbound = (DuplexStream, PeerIdentity);
type DialResult = std::result::Result<DuplexStream, String>;

pub struct MockEndpoint {
    rx: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl ListeningEndpoint for MockEndpoint {
    type Stream = DuplexStream;

    async fn accept(&mut self) -> Result<Inbound> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| anyhow!("endpoint closed"))
    }
}

/// Test-side control over one pending dial
pub struct DialControl {
    tx: oneshot::Sender<DialResult>,
}

impl DialControl {
    /// Complete the dial; returns the remote end of the new socket
    pub fn succeed(self) -> DuplexStream {
        let (local, remote) = duplex(PIPE_CAPACITY);
        let _ = self.tx.send(Ok(local));
        remote
    }

    pub fn fail(self, reason: &str) {
        let _ = self.tx.send(Err(reason.to_string()));
    }

    /// True once the dialing role has been dropped
    pub fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Default)]
pub struct MockTransport {
    binds: AtomicUsize,
    fail_bind: AtomicBool,
    dials: AtomicUsize,
    discovery_cancels: AtomicUsize,
    /// Feeds the most recently bound endpoint
    inbound: Mutex<Option<mpsc::UnboundedSender<Inbound>>>,
    pending_dials: Mutex<HashMap<String, oneshot::Receiver<DialResult>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binds(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn discovery_cancels(&self) -> usize {
        self.discovery_cancels.load(Ordering::SeqCst)
    }

    pub fn fail_binds(&self, fail: bool) {
        self.fail_bind.store(fail, Ordering::SeqCst);
    }

    /// Whether a bound endpoint is still alive
    pub fn endpoint_open(&self) -> bool {
        self.inbound
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Simulate a peer connecting in. Returns the peer's end of the socket,
    /// or `None` if no endpoint is listening.
    pub fn inbound(&self, name: &str) -> Option<DuplexStream> {
        let (local, remote) = duplex(PIPE_CAPACITY);
        let peer = PeerIdentity::new(format!("mock:{}", name), name);
        let guard = self.inbound.lock();
        let tx = guard.as_ref()?;
        tx.send((local, peer)).ok()?;
        Some(remote)
    }

    /// Register the next dial to `address`; the test decides how it ends
    pub fn expect_dial(&self, address: &str) -> DialControl {
        let (tx, rx) = oneshot::channel();
        self.pending_dials.lock().insert(address.to_string(), rx);
        DialControl { tx }
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Stream = DuplexStream;
    type Endpoint = MockEndpoint;

    async fn bind(&self, _service: &ServiceRecord) -> Result<MockEndpoint> {
        if self.fail_bind.load(Ordering::SeqCst) {
            return Err(anyhow!("adapter unavailable"));
        }
        self.binds.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbound.lock() = Some(tx);
        Ok(MockEndpoint { rx })
    }

    async fn dial(&self, peer: &PeerIdentity, _service: &ServiceRecord) -> Result<DuplexStream> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let pending = self.pending_dials.lock().remove(&peer.address);
        let rx = pending.ok_or_else(|| anyhow!("no route to {}", peer.address))?;
        match rx.await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(reason)) => Err(anyhow!(reason)),
            Err(_) => Err(anyhow!("dial abandoned")),
        }
    }

    fn cancel_discovery(&self) {
        self.discovery_cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
