//! Bluetooth device discovery for finding peers to dial

use anyhow::Result;
use bluer::{Adapter, Address, Device};
use futures::StreamExt;
use restodash_shared::PeerIdentity;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// Configuration for Bluetooth discovery
#[derive(Debug, Clone)]
pub struct BtDiscoveryConfig {
    /// How long to scan for devices
    pub scan_duration: Duration,
    /// Device name prefix to match (all named devices when unset)
    pub name_prefix: Option<String>,
}

impl Default for BtDiscoveryConfig {
    fn default() -> Self {
        Self {
            scan_duration: Duration::from_secs(10),
            name_prefix: None,
        }
    }
}

/// A device seen during a scan
#[derive(Debug, Clone)]
pub struct DiscoveredPeer {
    pub identity: PeerIdentity,
    /// Signal strength (if available)
    pub rssi: Option<i16>,
}

/// Bluetooth device discovery service
pub struct BtDiscovery {
    config: BtDiscoveryConfig,
}

impl BtDiscovery {
    pub fn new(config: BtDiscoveryConfig) -> Self {
        Self { config }
    }

    /// Get the default Bluetooth adapter, powered on
    pub async fn get_adapter(session: &bluer::Session) -> Result<Adapter> {
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        Ok(adapter)
    }

    /// Scan for nearby peers, strongest signal first
    pub async fn discover_peers(&self, adapter: &Adapter) -> Result<Vec<DiscoveredPeer>> {
        let mut peers = Vec::new();
        let mut seen: HashSet<Address> = HashSet::new();

        let discover = adapter.discover_devices().await?;
        tokio::pin!(discover);

        let scan_result = timeout(self.config.scan_duration, async {
            while let Some(evt) = discover.next().await {
                if let bluer::AdapterEvent::DeviceAdded(addr) = evt {
                    if !seen.insert(addr) {
                        continue;
                    }
                    let Ok(device) = adapter.device(addr) else {
                        continue;
                    };
                    if let Some(name) = self.matching_name(&device).await {
                        debug!("[BT] Found {} ({})", name, addr);
                        peers.push(DiscoveredPeer {
                            identity: PeerIdentity::new(addr.to_string(), name),
                            rssi: device.rssi().await.ok().flatten(),
                        });
                    }
                }
            }
        })
        .await;

        // Timeout is the normal end of a scan
        if scan_result.is_err() {
            info!("[BT] Discovery scan completed, {} peer(s)", peers.len());
        }

        sort_by_signal(&mut peers);
        Ok(peers)
    }

    /// Device name, if the device has one matching the configured prefix
    async fn matching_name(&self, device: &Device) -> Option<String> {
        let name = device.name().await.ok().flatten()?;
        match &self.config.name_prefix {
            Some(prefix) if !name.starts_with(prefix.as_str()) => None,
            _ => Some(name),
        }
    }
}

fn sort_by_signal(peers: &mut [DiscoveredPeer]) {
    peers.sort_by(|a, b| {
        let rssi_a = a.rssi.unwrap_or(i16::MIN);
        let rssi_b = b.rssi.unwrap_or(i16::MIN);
        rssi_b.cmp(&rssi_a)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BtDiscoveryConfig::default();
        assert_eq!(config.scan_duration, Duration::from_secs(10));
        assert!(config.name_prefix.is_none());
    }

    #[test]
    fn test_sort_strongest_first() {
        let peer = |name: &str, rssi| DiscoveredPeer {
            identity: PeerIdentity::new(name, name),
            rssi,
        };
        let mut peers = vec![peer("far", Some(-90)), peer("silent", None), peer("near", Some(-40))];
        sort_by_signal(&mut peers);
        let order: Vec<_> = peers.iter().map(|p| p.identity.name.as_str()).collect();
        assert_eq!(order, ["near", "far", "silent"]);
    }
}
