//! Dialer role: one outbound connection attempt

use super::manager::ConnectionManager;
use crate::transport::Transport;
use restodash_shared::{LinkError, PeerIdentity};
use tracing::info;

/// Dial `peer` once and report the outcome. Never retries on its own.
pub(super) async fn run<T: Transport>(
    manager: ConnectionManager<T>,
    role_id: u64,
    peer: PeerIdentity,
) {
    let transport = manager.transport();
    info!("[DIAL] Connecting to {} via {}", peer, transport.name());

    // Discovery slows down the connection
    transport.cancel_discovery();

    match transport.dial(&peer, manager.service()).await {
        Ok(stream) => {
            info!("[DIAL] Connected to {}", peer);
            manager.dial_succeeded(role_id, stream, peer);
        }
        Err(e) => {
            let error = LinkError::Dial {
                peer: peer.to_string(),
                reason: e.to_string(),
            };
            manager.dial_failed(role_id, error);
        }
    }
}
