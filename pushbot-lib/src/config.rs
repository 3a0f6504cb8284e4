use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::allocator::InstanceKeyAllocator;
use crate::bridge::BridgeOptions;
use crate::constants::DEFAULT_ROBOT_PORT;
use crate::control::CommandRole;
use crate::device::{Device, DeviceKind, ProtocolHandle};
use crate::error::{ConfigurationError, PushBotError};
use crate::protocol::{Mode, MunichProtocol};
use crate::transport::{Endianness, WireEncoding};

/// Link to the robot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// TCP with the line protocol
    #[default]
    Text,
    /// TCP with binary key/payload frames
    Binary,
    /// UDP datagrams with binary key/payload frames
    Udp,
}

/// Everything needed to build devices and a bridge, loaded from JSON.
///
/// ```json
/// {
///   "host": "10.162.177.57",
///   "devices": [
///     { "kind": "motor", "motor": 0 },
///     { "kind": "retina", "resolution": 64, "polarity": "up" }
///   ],
///   "neurons": { "motor0_permanent": 0 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    /// Local UDP port, 0 for any
    pub local_port: u16,
    pub transport: TransportKind,
    pub endianness: Endianness,
    pub recv_timeout_ms: u64,
    pub uart_id: u8,
    pub mode: Mode,
    /// Put all devices on one protocol instance
    pub share_protocol: bool,
    pub devices: Vec<DeviceKind>,
    pub neurons: BTreeMap<CommandRole, u8>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_ROBOT_PORT,
            local_port: 0,
            transport: TransportKind::default(),
            endianness: Endianness::default(),
            recv_timeout_ms: 100,
            uart_id: 0,
            mode: Mode::PushBot,
            share_protocol: true,
            devices: Vec::new(),
            neurons: BTreeMap::new(),
        }
    }
}

impl BridgeConfig {
    pub fn from_json(json: &str) -> Result<Self, PushBotError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PushBotError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn robot_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn encoding(&self) -> WireEncoding {
        match self.transport {
            TransportKind::Text => WireEncoding::Text,
            TransportKind::Binary | TransportKind::Udp => WireEncoding::Binary {
                endianness: self.endianness,
            },
        }
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            encoding: self.encoding(),
            recv_timeout: self.recv_timeout(),
            neurons: self.neurons.clone(),
        }
    }

    /// Build the configured devices, in order, with ids from `allocator`.
    pub fn build_devices(&self, allocator: &InstanceKeyAllocator) -> Result<Vec<Device>, ConfigurationError> {
        let shared = self
            .share_protocol
            .then(|| Arc::new(MunichProtocol::new(self.mode, allocator)));

        self.devices
            .iter()
            .map(|&kind| {
                let protocol = match &shared {
                    Some(protocol) => ProtocolHandle::Shared(protocol.clone()),
                    None => ProtocolHandle::Owned(MunichProtocol::new(self.mode, allocator)),
                };
                Device::new(kind, protocol, self.uart_id)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_json("{}").unwrap();
        assert_eq!(config.port, 56000);
        assert_eq!(config.recv_timeout(), Duration::from_millis(100));
        assert_eq!(config.encoding(), WireEncoding::Text);
        assert!(config.share_protocol);
    }

    #[test]
    fn test_owned_protocols_get_distinct_instances() {
        let config = BridgeConfig::from_json(
            r#"{ "share_protocol": false, "devices": [ { "kind": "motor" }, { "kind": "laser" } ] }"#,
        )
        .unwrap();
        let allocator = InstanceKeyAllocator::new();
        let devices = config.build_devices(&allocator).unwrap();
        assert_eq!(devices[0].protocol().instance_key(), 0);
        assert_eq!(devices[1].protocol().instance_key(), 1 << 11);
        // each owned protocol sends its own mode select
        assert!(devices.iter().all(|d| d.start_resume_commands()[0].payload == Some(1)));
    }
}
