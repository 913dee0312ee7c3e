mod connection;
mod transport;

use anyhow::Result;
use connection::{ConnectionManager, LinkConfig, TransportMode};
use restodash_shared::{ConnectionState, LinkEvent, PeerIdentity};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use transport::{TcpTransport, Transport};

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = LinkConfig::from_env()?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    let scan = args.iter().any(|a| a == "--scan");
    let peer = peer_from_args(&args);

    info!("Restodash link starting ({:?})", config.mode);

    match config.mode {
        TransportMode::TcpSimulation => {
            let transport = Arc::new(TcpTransport::new(config.tcp_address.clone()));
            info!("  Listening on {}", transport.listen_address());
            run(transport, &config, peer).await
        }
        TransportMode::Rfcomm => run_rfcomm(&config, peer, scan).await,
    }
}

/// `[address [name]]`, ignoring `--` flags
fn peer_from_args(args: &[String]) -> Option<PeerIdentity> {
    let mut positional = args.iter().filter(|a| !a.starts_with("--"));
    let address = positional.next()?;
    Some(match positional.next() {
        Some(name) => PeerIdentity::new(address.as_str(), name.as_str()),
        None => PeerIdentity::unnamed(address.as_str()),
    })
}

#[cfg(feature = "rfcomm")]
async fn run_rfcomm(config: &LinkConfig, peer: Option<PeerIdentity>, scan: bool) -> Result<()> {
    use transport::{BtDiscoveryConfig, RfcommTransport};

    let transport = Arc::new(RfcommTransport::new(BtDiscoveryConfig::default()).await?);
    if scan {
        for found in transport.discover().await? {
            info!("  Found {} (rssi {:?})", found.identity, found.rssi);
        }
    }
    run(transport, config, peer).await
}

#[cfg(not(feature = "rfcomm"))]
async fn run_rfcomm(
    _config: &LinkConfig,
    _peer: Option<PeerIdentity>,
    _scan: bool,
) -> Result<()> {
    Err(anyhow::anyhow!(
        "RFCOMM mode requires building with the `rfcomm` feature"
    ))
}

/// Drive the link: stdin lines go to the peer, events are logged
async fn run<T: Transport>(
    transport: Arc<T>,
    config: &LinkConfig,
    peer: Option<PeerIdentity>,
) -> Result<()> {
    let (manager, mut events) = ConnectionManager::new(transport, config);

    manager.start();
    if let Some(peer) = peer {
        manager.connect(peer);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    handle_event(event);
                    debug!("Roles: {:?}", manager.roles());
                }
                None => {
                    error!("Event channel closed");
                    break;
                }
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(mut line) => {
                    if manager.state() != ConnectionState::Connected {
                        warn!("Not connected, input dropped");
                    }
                    line.push('\n');
                    manager.send(line.into_bytes());
                }
                None => stdin_open = false,
            },
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }
    }

    manager.stop();
    Ok(())
}

fn handle_event(event: LinkEvent) {
    match event {
        LinkEvent::DeviceName { name } => info!("Connected to {}", name),
        LinkEvent::DataReceived { data, len } => {
            info!("<< {}", String::from_utf8_lossy(&data[..len]).trim_end())
        }
        LinkEvent::DataSent { data } => debug!(">> {} byte(s)", data.len()),
        LinkEvent::TransientError { message } => warn!("{}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_peer_from_args() {
        assert!(peer_from_args(&args(&[])).is_none());
        assert!(peer_from_args(&args(&["--scan"])).is_none());

        let peer = peer_from_args(&args(&["--scan", "00:11:22:33:44:55", "Dash"])).unwrap();
        assert_eq!(peer, PeerIdentity::new("00:11:22:33:44:55", "Dash"));

        let peer = peer_from_args(&args(&["127.0.0.1:9000"])).unwrap();
        assert_eq!(peer.name, "127.0.0.1:9000");
    }
}
