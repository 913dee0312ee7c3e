//! Listener role: waits for an inbound connection on the service endpoint

use super::manager::ConnectionManager;
use crate::transport::{ListeningEndpoint, Transport};
use restodash_shared::{ConnectionState, LinkError};
use tokio::sync::MutexGuard;
use tracing::{debug, error, info};

/// Bound endpoint plus the slot claim. Fields drop in order, so the endpoint
/// is closed before the next listener may bind.
struct Bound<'a, E> {
    endpoint: E,
    _slot: MutexGuard<'a, ()>,
}

/// Bind the service endpoint and hand every accepted socket to the manager.
///
/// Ends on bind failure, on accept failure, or once the link is connected.
/// Cancelling the task drops the endpoint, which closes it.
pub(super) async fn run<T: Transport>(manager: ConnectionManager<T>) {
    let transport = manager.transport();
    let slot = manager.claim_endpoint_slot().await;

    let mut bound = match transport.bind(manager.service()).await {
        Ok(endpoint) => Bound {
            endpoint,
            _slot: slot,
        },
        Err(e) => {
            error!("[LISTEN] {}", LinkError::Bind(e.to_string()));
            return;
        }
    };
    info!("[LISTEN] Waiting for inbound connections via {}", transport.name());

    while manager.state() != ConnectionState::Connected {
        match bound.endpoint.accept().await {
            Ok((stream, peer)) => {
                debug!("[LISTEN] Accepted {}", peer);
                // The manager decides whether this socket is promoted or closed
                manager.accepted(stream, peer);
            }
            Err(e) => {
                error!("[LISTEN] {}", LinkError::Accept(e.to_string()));
                break;
            }
        }
    }

    info!("[LISTEN] Listener finished");
}
