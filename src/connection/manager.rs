//! Connection manager owning the link state and its three roles
//!
//! All state and role-handle changes happen under one transition lock. Roles
//! run as independent tasks and report back through the `pub(super)`
//! callbacks below; they never touch the manager's fields directly.

use super::config::LinkConfig;
use super::{dialer, listener, pump};
use crate::transport::{ServiceRecord, Transport};
use bytes::Bytes;
use parking_lot::Mutex;
use restodash_shared::{
    accepts_inbound, next_state, ConnectionState, LinkError, LinkEvent, LinkTrigger, PeerIdentity,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handle to a running listener or dialer task
struct RoleHandle {
    id: u64,
    task: JoinHandle<()>,
}

impl RoleHandle {
    /// Abort the task, dropping (and so closing) the resource it owns
    fn cancel(self) {
        self.task.abort();
    }

    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Handle to the running data pump
struct PumpHandle {
    id: u64,
    task: JoinHandle<()>,
    outbound: mpsc::UnboundedSender<Bytes>,
}

impl PumpHandle {
    fn cancel(self) {
        self.task.abort();
    }
}

/// Everything guarded by the transition lock
#[derive(Default)]
struct Inner {
    state: ConnectionState,
    listener: Option<RoleHandle>,
    dialer: Option<RoleHandle>,
    pump: Option<PumpHandle>,
}

impl Inner {
    fn transition(&mut self, trigger: LinkTrigger) {
        let from = self.state;
        self.state = next_state(from, trigger);
        if from != self.state {
            debug!("[LINK] {} -> {} ({:?})", from, self.state, trigger);
        }
    }

    fn cancel_dialer(&mut self) {
        if let Some(dialer) = self.dialer.take() {
            dialer.cancel();
        }
    }

    fn cancel_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.cancel();
        }
    }

    fn cancel_listener(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.cancel();
        }
    }

    fn is_current_dialer(&self, role_id: u64) -> bool {
        self.dialer.as_ref().is_some_and(|d| d.id == role_id)
    }

    fn is_current_pump(&self, role_id: u64) -> bool {
        self.pump.as_ref().is_some_and(|p| p.id == role_id)
    }
}

/// Point-in-time view of the manager, taken under the transition lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSnapshot {
    pub state: ConnectionState,
    /// A listener task is installed and still running
    pub listening: bool,
    /// A dialer task is installed and still running
    pub dialing: bool,
    /// A data pump is installed
    pub pumping: bool,
}

struct Shared<T: Transport> {
    transport: Arc<T>,
    service: ServiceRecord,
    read_buffer_size: usize,
    runtime: Handle,
    events: mpsc::UnboundedSender<LinkEvent>,
    next_role_id: AtomicU64,
    /// Held by a listener from before bind until its endpoint is dropped
    endpoint_slot: tokio::sync::Mutex<()>,
    inner: Mutex<Inner>,
}

/// Manages a single link: listens, dials, and pumps bytes once connected.
///
/// Cheap to clone; every clone drives the same link. Roles keep the manager
/// alive while they run, so call [`stop`](Self::stop) to release them.
pub struct ConnectionManager<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for ConnectionManager<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Transport> ConnectionManager<T> {
    /// Create an idle manager and the receiver its events are posted to.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime; roles are spawned on the
    /// runtime current at construction.
    pub fn new(
        transport: Arc<T>,
        config: &LinkConfig,
    ) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();

        let shared = Shared {
            transport,
            service: config.service(),
            read_buffer_size: config.read_buffer_size.max(1),
            runtime: Handle::current(),
            events,
            next_role_id: AtomicU64::new(1),
            endpoint_slot: tokio::sync::Mutex::new(()),
            inner: Mutex::new(Inner::default()),
        };

        let manager = Self {
            shared: Arc::new(shared),
        };
        (manager, event_rx)
    }

    /// Current link state
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Which roles are currently installed
    pub fn roles(&self) -> RoleSnapshot {
        let inner = self.shared.inner.lock();
        RoleSnapshot {
            state: inner.state,
            listening: inner.listener.as_ref().is_some_and(RoleHandle::is_live),
            dialing: inner.dialer.as_ref().is_some_and(RoleHandle::is_live),
            pumping: inner.pump.is_some(),
        }
    }

    /// Listen for an inbound connection, dropping any dial or live link.
    ///
    /// Safe to call while already listening.
    pub fn start(&self) {
        info!("[LINK] Start via {}", self.shared.transport.name());
        let mut inner = self.shared.inner.lock();
        self.start_locked(&mut inner);
    }

    /// Dial `peer`. A newer call preempts an older attempt.
    pub fn connect(&self, peer: PeerIdentity) {
        info!("[LINK] Connect to {}", peer);
        let mut inner = self.shared.inner.lock();

        inner.cancel_dialer();
        inner.cancel_pump();

        inner.dialer = Some(self.spawn_dialer(peer));
        inner.transition(LinkTrigger::Connect);
    }

    /// Cancel every role and go idle
    pub fn stop(&self) {
        info!("[LINK] Stop");
        let mut inner = self.shared.inner.lock();

        inner.cancel_dialer();
        inner.cancel_pump();
        inner.cancel_listener();
        inner.transition(LinkTrigger::Stop);
    }

    /// Queue bytes for the peer. Silently dropped unless connected.
    pub fn send(&self, data: impl Into<Bytes>) {
        // Sample state and pump together, then write outside the lock
        let outbound = {
            let inner = self.shared.inner.lock();
            match (inner.state, &inner.pump) {
                (ConnectionState::Connected, Some(pump)) => pump.outbound.clone(),
                _ => return,
            }
        };

        // Fails only if the pump is already being torn down
        let _ = outbound.send(data.into());
    }

    pub(super) fn transport(&self) -> &T {
        &self.shared.transport
    }

    pub(super) fn service(&self) -> &ServiceRecord {
        &self.shared.service
    }

    pub(super) fn read_buffer_size(&self) -> usize {
        self.shared.read_buffer_size
    }

    /// Wait until no earlier listener still owns an endpoint.
    ///
    /// Aborting a listener only drops its endpoint once the runtime polls the
    /// task again, so a restart must not bind before then.
    pub(super) async fn claim_endpoint_slot(&self) -> MutexGuard<'_, ()> {
        self.shared.endpoint_slot.lock().await
    }

    pub(super) fn emit(&self, event: LinkEvent) {
        let _ = self.shared.events.send(event);
    }

    /// The listener obtained an inbound socket
    pub(super) fn accepted(&self, stream: T::Stream, peer: PeerIdentity) {
        let mut inner = self.shared.inner.lock();

        if accepts_inbound(inner.state) {
            self.promote(&mut inner, stream, peer, LinkTrigger::Accepted);
        } else {
            debug!(
                "[LINK] Closing unwanted socket from {} (state {})",
                peer, inner.state
            );
            drop(stream);
        }
    }

    /// The dialer `role_id` connected. Retires the dialer as part of promotion.
    pub(super) fn dial_succeeded(&self, role_id: u64, stream: T::Stream, peer: PeerIdentity) {
        let mut inner = self.shared.inner.lock();

        if !inner.is_current_dialer(role_id) {
            debug!("[LINK] Discarding socket from cancelled dialer to {}", peer);
            drop(stream);
            return;
        }

        // The dialer task ends right after this call; release without aborting
        inner.dialer = None;
        self.promote(&mut inner, stream, peer, LinkTrigger::DialSucceeded);
    }

    /// The dialer `role_id` could not connect
    pub(super) fn dial_failed(&self, role_id: u64, error: LinkError) {
        let mut inner = self.shared.inner.lock();

        if !inner.is_current_dialer(role_id) {
            debug!("[LINK] Ignoring failure from cancelled dialer: {}", error);
            return;
        }

        inner.dialer = None;
        warn!("[LINK] {}", error);
        self.recover(&mut inner, &error, LinkTrigger::DialFailed);
    }

    /// The pump `role_id` lost its link
    pub(super) fn link_lost(&self, role_id: u64, error: LinkError) {
        let mut inner = self.shared.inner.lock();

        if !inner.is_current_pump(role_id) {
            debug!("[LINK] Ignoring loss reported by retired pump: {}", error);
            return;
        }

        inner.pump = None;
        warn!("[LINK] {}", error);
        self.recover(&mut inner, &error, LinkTrigger::LinkLost);
    }

    fn start_locked(&self, inner: &mut Inner) {
        inner.cancel_dialer();
        inner.cancel_pump();

        // A listener that hit a bind or accept failure has ended; replace it
        if inner.listener.as_ref().is_some_and(|l| !l.is_live()) {
            debug!("[LINK] Replacing terminated listener");
            inner.listener = None;
        }
        if inner.listener.is_none() {
            inner.listener = Some(self.spawn_listener());
        }

        inner.transition(LinkTrigger::Start);
    }

    /// Only one peer may be connected: retire every other role, then pump
    fn promote(
        &self,
        inner: &mut Inner,
        stream: T::Stream,
        peer: PeerIdentity,
        trigger: LinkTrigger,
    ) {
        inner.cancel_dialer();
        inner.cancel_pump();
        inner.cancel_listener();

        inner.transition(trigger);
        inner.pump = Some(self.spawn_pump(stream));

        info!("[LINK] Connected to {}", peer);
        self.emit(LinkEvent::DeviceName { name: peer.name });
    }

    /// Report the failure, then go back to listening
    fn recover(&self, inner: &mut Inner, error: &LinkError, trigger: LinkTrigger) {
        self.emit(LinkEvent::TransientError {
            message: error.user_message().to_string(),
        });
        inner.transition(trigger);
        self.start_locked(inner);
    }

    fn next_role_id(&self) -> u64 {
        self.shared.next_role_id.fetch_add(1, Ordering::Relaxed)
    }

    fn spawn_listener(&self) -> RoleHandle {
        let id = self.next_role_id();
        let task = self.shared.runtime.spawn(listener::run(self.clone()));
        RoleHandle { id, task }
    }

    fn spawn_dialer(&self, peer: PeerIdentity) -> RoleHandle {
        let id = self.next_role_id();
        let task = self.shared.runtime.spawn(dialer::run(self.clone(), id, peer));
        RoleHandle { id, task }
    }

    fn spawn_pump(&self, stream: T::Stream) -> PumpHandle {
        let id = self.next_role_id();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = self
            .shared
            .runtime
            .spawn(pump::run(self.clone(), id, stream, outbound_rx));
        PumpHandle { id, task, outbound }
    }
}
