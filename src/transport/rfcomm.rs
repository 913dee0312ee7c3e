//! RFCOMM transport implementation for Bluetooth connections

use crate::transport::bt_discovery::{BtDiscovery, BtDiscoveryConfig, DiscoveredPeer};
use crate::transport::traits::{ListeningEndpoint, ServiceRecord, Transport};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluer::rfcomm::{Profile, ProfileHandle, Role, SocketAddr as RfcommAddr, Stream as RfcommStream};
use bluer::{Adapter, Address, Session, Uuid};
use futures::StreamExt;
use parking_lot::Mutex;
use restodash_shared::PeerIdentity;
use tokio::task::AbortHandle;
use tracing::{debug, info};

/// Listening endpoint backed by a registered RFCOMM server profile.
///
/// Dropping it unregisters the profile and removes the service record.
pub struct RfcommEndpoint {
    handle: ProfileHandle,
    adapter: Adapter,
}

#[async_trait]
impl ListeningEndpoint for RfcommEndpoint {
    type Stream = RfcommStream;

    async fn accept(&mut self) -> Result<(RfcommStream, PeerIdentity)> {
        let request = self
            .handle
            .next()
            .await
            .ok_or_else(|| anyhow!("RFCOMM profile unregistered"))?;

        let address = request.device();
        let stream = request
            .accept()
            .map_err(|e| anyhow!("RFCOMM accept from {} failed: {}", address, e))?;

        let name = device_name(&self.adapter, address).await;
        Ok((stream, PeerIdentity::new(address.to_string(), name)))
    }
}

/// Bluetooth RFCOMM transport through BlueZ
pub struct RfcommTransport {
    session: Session,
    adapter: Adapter,
    discovery: BtDiscoveryConfig,
    /// Scan in progress, if any
    scan: Mutex<Option<AbortHandle>>,
}

impl RfcommTransport {
    /// Connect to BlueZ and power on the default adapter
    pub async fn new(discovery: BtDiscoveryConfig) -> Result<Self> {
        let session = Session::new().await?;
        let adapter = BtDiscovery::get_adapter(&session).await?;
        info!("[BT] Using adapter {}", adapter.name());
        Ok(Self {
            session,
            adapter,
            discovery,
            scan: Mutex::new(None),
        })
    }

    /// Scan for nearby peers. Returns an error if the scan is cancelled.
    pub async fn discover(&self) -> Result<Vec<DiscoveredPeer>> {
        let adapter = self.adapter.clone();
        let discovery = BtDiscovery::new(self.discovery.clone());
        let task = tokio::spawn(async move { discovery.discover_peers(&adapter).await });

        *self.scan.lock() = Some(task.abort_handle());
        let result = task.await;
        self.scan.lock().take();

        match result {
            Ok(peers) => peers,
            Err(e) if e.is_cancelled() => Err(anyhow!("Discovery cancelled")),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Transport for RfcommTransport {
    type Stream = RfcommStream;
    type Endpoint = RfcommEndpoint;

    async fn bind(&self, service: &ServiceRecord) -> Result<RfcommEndpoint> {
        let uuid = Uuid::parse_str(&service.uuid)?;
        let profile = Profile {
            uuid,
            name: Some(service.name.clone()),
            channel: Some(service.channel.into()),
            role: Some(Role::Server),
            require_authentication: Some(false),
            require_authorization: Some(false),
            ..Default::default()
        };

        let handle = self.session.register_profile(profile).await?;
        debug!("[BT] Registered service {} on channel {}", uuid, service.channel);
        Ok(RfcommEndpoint {
            handle,
            adapter: self.adapter.clone(),
        })
    }

    async fn dial(&self, peer: &PeerIdentity, service: &ServiceRecord) -> Result<RfcommStream> {
        let address: Address = peer
            .address
            .parse()
            .map_err(|e| anyhow!("Invalid Bluetooth address {}: {}", peer.address, e))?;

        let socket_addr = RfcommAddr::new(address, service.channel);
        debug!("[BT] Connecting to {} channel {}", address, service.channel);

        let stream = RfcommStream::connect(socket_addr)
            .await
            .map_err(|e| anyhow!("RFCOMM connect failed: {}", e))?;
        Ok(stream)
    }

    fn cancel_discovery(&self) {
        if let Some(scan) = self.scan.lock().take() {
            debug!("[BT] Cancelling discovery");
            scan.abort();
        }
    }

    fn name(&self) -> &'static str {
        "Bluetooth"
    }
}

/// Remote device name, falling back to its address
async fn device_name(adapter: &Adapter, address: Address) -> String {
    match adapter.device(address) {
        Ok(device) => device
            .name()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| address.to_string()),
        Err(_) => address.to_string(),
    }
}
