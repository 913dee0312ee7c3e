#[cfg(feature = "rfcomm")]
pub mod bt_discovery;
#[cfg(feature = "rfcomm")]
pub mod rfcomm;
pub mod tcp;
pub mod traits;

#[cfg(test)]
pub mod mock;

#[cfg(feature = "rfcomm")]
pub use bt_discovery::{BtDiscoveryConfig, DiscoveredPeer};
#[cfg(feature = "rfcomm")]
pub use rfcomm::RfcommTransport;
pub use tcp::TcpTransport;
pub use traits::{ListeningEndpoint, ServiceRecord, Transport};
