//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use hex;
#[allow(unused_imports)]
pub use pushbot_lib::allocator::InstanceKeyAllocator;
#[allow(unused_imports)]
pub use pushbot_lib::classifier::{StreamFrameClassifier, StreamItem};
#[allow(unused_imports)]
pub use pushbot_lib::command::{Command, SendTime};
#[allow(unused_imports)]
pub use pushbot_lib::control::{CommandRole, NeuronCommandMapper};
#[allow(unused_imports)]
pub use pushbot_lib::device::{
    Device, DeviceKind, LaserConfig, LedConfig, LedPosition, MotorConfig, MotorId, ProtocolHandle, RetinaConfig,
    SensorConfig, SpeakerConfig,
};
#[allow(unused_imports)]
pub use pushbot_lib::error::{ConfigurationError, ProtocolError, PushBotError, TransportError};
#[allow(unused_imports)]
pub use pushbot_lib::protocol::{CommandId, Mode, MunichProtocol};
#[allow(unused_imports)]
pub use pushbot_lib::retina::{RetinaEventFormat, RetinaPolarity, RetinaResolution, TimestampSize};

use std::sync::{Arc, Mutex};

/// Decode hex string to bytes for testing
#[allow(dead_code)]
pub fn hex_to_bytes(hex_data: &str) -> Bytes {
    Bytes::from(hex::decode(hex_data).expect("Failed to decode hex"))
}

/// A push bot protocol on its own instance from a fresh id space
#[allow(dead_code)]
pub fn push_bot_protocol(allocator: &InstanceKeyAllocator) -> ProtocolHandle {
    ProtocolHandle::Owned(MunichProtocol::new(Mode::PushBot, allocator))
}

/// One of every actuator, all sharing `protocol`
#[allow(dead_code)]
pub fn actuators(protocol: &Arc<MunichProtocol>) -> Vec<Device> {
    let kinds = [
        DeviceKind::Motor(MotorConfig { motor: MotorId::Zero }),
        DeviceKind::Motor(MotorConfig { motor: MotorId::One }),
        DeviceKind::Laser(LaserConfig {
            start_total_period: 200,
            start_active_time: 100,
            start_frequency: 20,
        }),
        DeviceKind::Led(LedConfig {
            position: LedPosition::Front,
            start_total_period: 300,
            start_active_time: 150,
            start_frequency: 30,
        }),
        DeviceKind::Led(LedConfig {
            position: LedPosition::Back,
            start_total_period: 300,
            start_active_time: 120,
            start_frequency: 30,
        }),
        DeviceKind::Speaker(SpeakerConfig {
            start_total_period: 400,
            start_active_time: 200,
            start_frequency: Some(440),
            start_melody: None,
        }),
    ];
    kinds
        .into_iter()
        .map(|kind| Device::new(kind, ProtocolHandle::Shared(protocol.clone()), 0).expect("device builds"))
        .collect()
}

/// Handler that keeps everything it is given
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingHandler {
    pub spikes: Mutex<Vec<u32>>,
    pub lines: Mutex<Vec<String>>,
}

impl pushbot_lib::BridgeHandler for RecordingHandler {
    fn on_spike_injected(&self, neuron_id: u32) {
        self.spikes.lock().unwrap().push(neuron_id);
    }

    fn on_text_report(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

/// Route library logs to the test output, filtered by `RUST_LOG`
#[allow(dead_code)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
