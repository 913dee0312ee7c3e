//! Link configuration

use crate::transport::ServiceRecord;
use anyhow::{anyhow, Result};
use restodash_shared::service;

/// Which transport carries the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Use real RFCOMM Bluetooth (requires BlueZ and the `rfcomm` feature)
    Rfcomm,
    /// Use TCP simulation (for development)
    #[default]
    TcpSimulation,
}

/// Configuration for the connection manager
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Transport mode
    pub mode: TransportMode,
    /// Name published in the service record
    pub service_name: String,
    /// Service UUID peers connect to
    pub service_uuid: String,
    /// RFCOMM channel number
    pub channel: u8,
    /// Listen address when mode is TcpSimulation
    pub tcp_address: String,
    /// Size of the data pump's read buffer
    pub read_buffer_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::TcpSimulation,
            service_name: service::SERVICE_NAME.into(),
            service_uuid: service::SERVICE_UUID.into(),
            channel: service::DEFAULT_CHANNEL,
            tcp_address: "127.0.0.1:9000".into(),
            read_buffer_size: service::READ_BUFFER_SIZE,
        }
    }
}

impl LinkConfig {
    /// Build a config from defaults plus `RESTODASH_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (`RESTODASH_MODE`, `RESTODASH_LISTEN`,
    /// `RESTODASH_CHANNEL`)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(mode) = lookup("RESTODASH_MODE") {
            self.mode = match mode.to_ascii_lowercase().as_str() {
                "rfcomm" | "bluetooth" => TransportMode::Rfcomm,
                "tcp" => TransportMode::TcpSimulation,
                other => return Err(anyhow!("Unknown transport mode: {}", other)),
            };
        }
        if let Some(address) = lookup("RESTODASH_LISTEN") {
            self.tcp_address = address;
        }
        if let Some(channel) = lookup("RESTODASH_CHANNEL") {
            self.channel = channel
                .parse()
                .map_err(|e| anyhow!("Invalid RFCOMM channel {}: {}", channel, e))?;
        }
        Ok(())
    }

    /// Service record the listener binds to and the dialer targets
    pub fn service(&self) -> ServiceRecord {
        ServiceRecord {
            name: self.service_name.clone(),
            uuid: self.service_uuid.clone(),
            channel: self.channel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = LinkConfig::default();
        assert_eq!(config.mode, TransportMode::TcpSimulation);
        assert_eq!(config.service_uuid, "688c1706-fcb4-4856-be4b-f7d6f8465b6f");
        assert_eq!(config.channel, 1);
        assert_eq!(config.read_buffer_size, 1024);
    }

    #[test]
    fn test_overrides() {
        let mut config = LinkConfig::default();
        config
            .apply_overrides(lookup(&[
                ("RESTODASH_MODE", "Bluetooth"),
                ("RESTODASH_CHANNEL", "4"),
                ("RESTODASH_LISTEN", "0.0.0.0:9100"),
            ]))
            .expect("overrides rejected");

        assert_eq!(config.mode, TransportMode::Rfcomm);
        assert_eq!(config.channel, 4);
        assert_eq!(config.tcp_address, "0.0.0.0:9100");
        assert_eq!(config.service().channel, 4);
    }

    #[test]
    fn test_invalid_overrides() {
        let mut config = LinkConfig::default();
        assert!(config
            .apply_overrides(lookup(&[("RESTODASH_MODE", "carrier-pigeon")]))
            .is_err());
        assert!(config
            .apply_overrides(lookup(&[("RESTODASH_CHANNEL", "300")]))
            .is_err());
    }
}
