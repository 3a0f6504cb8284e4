use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;

use crate::command::{Command, SendTime};
use crate::constants::MOTOR_ENABLE;
use crate::control::{CommandKeySource, OwnedKey};
use crate::error::ConfigurationError;
use crate::protocol::{CommandId, MunichProtocol, RetinaTransmission};
use crate::retina::{RetinaEventFormat, RetinaPolarity, RetinaResolution, TimestampSize};

/// Sensor id of the push bot accelerometer
pub const ACCELEROMETER_SENSOR_ID: u8 = 8;

const DEFAULT_SENSOR_POLL_MS: u32 = 100;

fn default_sensor_id() -> u8 {
    ACCELEROMETER_SENSOR_ID
}

fn default_sensor_poll_ms() -> u32 {
    DEFAULT_SENSOR_POLL_MS
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaserConfig {
    pub start_total_period: u32,
    pub start_active_time: u32,
    pub start_frequency: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedPosition {
    #[default]
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    pub position: LedPosition,
    pub start_total_period: u32,
    pub start_active_time: u32,
    pub start_frequency: u32,
}

/// Exactly one of `start_frequency` and `start_melody` must be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakerConfig {
    pub start_total_period: u32,
    pub start_active_time: u32,
    pub start_frequency: Option<u32>,
    pub start_melody: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MotorId {
    #[default]
    Zero,
    One,
}

impl TryFrom<u8> for MotorId {
    type Error = String;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(MotorId::Zero),
            1 => Ok(MotorId::One),
            other => Err(format!("push bot has motors 0 and 1, not {other}")),
        }
    }
}

impl From<MotorId> for u8 {
    fn from(id: MotorId) -> Self {
        match id {
            MotorId::Zero => 0,
            MotorId::One => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    pub motor: MotorId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetinaConfig {
    pub resolution: RetinaResolution,
    pub polarity: RetinaPolarity,
    pub timestamps: Option<TimestampSize>,
    /// Key the robot puts on retina events
    pub routing_key: u32,
}

impl Default for RetinaConfig {
    fn default() -> Self {
        Self {
            resolution: RetinaResolution::Native128,
            polarity: RetinaPolarity::Merged,
            timestamps: None,
            routing_key: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    #[serde(default = "default_sensor_id")]
    pub sensor_id: u8,
    #[serde(default = "default_sensor_poll_ms")]
    pub poll_period_ms: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            sensor_id: ACCELEROMETER_SENSOR_ID,
            poll_period_ms: DEFAULT_SENSOR_POLL_MS,
        }
    }
}

/// What a device is, with its start-up state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceKind {
    Laser(LaserConfig),
    Led(LedConfig),
    Speaker(SpeakerConfig),
    Motor(MotorConfig),
    Retina(RetinaConfig),
    Sensor(SensorConfig),
}

impl DeviceKind {
    pub fn name(&self) -> &'static str {
        match self {
            DeviceKind::Laser(_) => "laser",
            DeviceKind::Led(LedConfig {
                position: LedPosition::Front,
                ..
            }) => "led_front",
            DeviceKind::Led(LedConfig {
                position: LedPosition::Back,
                ..
            }) => "led_back",
            DeviceKind::Speaker(_) => "speaker",
            DeviceKind::Motor(MotorConfig { motor: MotorId::Zero }) => "motor_0",
            DeviceKind::Motor(MotorConfig { motor: MotorId::One }) => "motor_1",
            DeviceKind::Retina(_) => "retina",
            DeviceKind::Sensor(_) => "sensor",
        }
    }

    /// Commands the device answers to, in the order they are listed for routing.
    fn command_ids(&self) -> &'static [CommandId] {
        match self {
            DeviceKind::Laser(_) => &[
                CommandId::LaserTotalPeriod,
                CommandId::LaserActiveTime,
                CommandId::LaserFrequency,
            ],
            DeviceKind::Led(LedConfig {
                position: LedPosition::Front,
                ..
            }) => &[
                CommandId::LedTotalPeriod,
                CommandId::LedFrontActiveTime,
                CommandId::LedFrequency,
            ],
            DeviceKind::Led(LedConfig {
                position: LedPosition::Back,
                ..
            }) => &[
                CommandId::LedTotalPeriod,
                CommandId::LedBackActiveTime,
                CommandId::LedFrequency,
            ],
            DeviceKind::Speaker(_) => &[
                CommandId::SpeakerTotalPeriod,
                CommandId::SpeakerActiveTime,
                CommandId::SpeakerTone,
                CommandId::SpeakerMelody,
            ],
            DeviceKind::Motor(MotorConfig { motor: MotorId::Zero }) => &[
                CommandId::MotorEnableDisable,
                CommandId::Motor0Permanent,
                CommandId::Motor0Leaky,
            ],
            DeviceKind::Motor(MotorConfig { motor: MotorId::One }) => &[
                CommandId::MotorEnableDisable,
                CommandId::Motor1Permanent,
                CommandId::Motor1Leaky,
            ],
            DeviceKind::Retina(_) => &[
                CommandId::DisableRetina,
                CommandId::RetinaSetKey,
                CommandId::RetinaTransmission,
            ],
            DeviceKind::Sensor(_) => &[CommandId::PollSensorsContinuously, CommandId::SensorReportingOff],
        }
    }
}

/// The protocol instance a device emits on.
#[derive(Debug)]
pub enum ProtocolHandle {
    /// The device has an instance to itself
    Owned(MunichProtocol),
    /// Several devices share one instance and so one set of keys
    Shared(Arc<MunichProtocol>),
}

impl Deref for ProtocolHandle {
    type Target = MunichProtocol;

    fn deref(&self) -> &MunichProtocol {
        match self {
            ProtocolHandle::Owned(protocol) => protocol,
            ProtocolHandle::Shared(protocol) => protocol,
        }
    }
}

/// Command lists of one device, built once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCommandSet {
    pub start_resume: Vec<Command>,
    pub pause_stop: Vec<Command>,
    pub timed: Vec<Command>,
}

impl DeviceCommandSet {
    fn build(kind: &DeviceKind, protocol: &MunichProtocol, uart_id: u8) -> Result<Self, ConfigurationError> {
        let start = SendTime::OnStart;
        let pause = SendTime::OnPause;
        let p = protocol;

        let (start_resume, pause_stop) = match kind {
            DeviceKind::Laser(config) => (
                vec![
                    p.push_bot_laser_config_total_period(config.start_total_period, uart_id, start)?,
                    p.push_bot_laser_config_active_time(config.start_active_time, uart_id, start)?,
                    p.push_bot_laser_set_frequency(config.start_frequency, uart_id, start)?,
                ],
                vec![
                    p.push_bot_laser_config_total_period(0, uart_id, pause)?,
                    p.push_bot_laser_config_active_time(0, uart_id, pause)?,
                    p.push_bot_laser_set_frequency(0, uart_id, pause)?,
                ],
            ),
            DeviceKind::Led(config) => {
                let active_time = |value, time| match config.position {
                    LedPosition::Front => p.push_bot_led_front_active_time(value, uart_id, time),
                    LedPosition::Back => p.push_bot_led_back_active_time(value, uart_id, time),
                };
                (
                    vec![
                        p.push_bot_led_total_period(config.start_total_period, uart_id, start)?,
                        active_time(config.start_active_time, start)?,
                        p.push_bot_led_set_frequency(config.start_frequency, uart_id, start)?,
                    ],
                    vec![
                        p.push_bot_led_total_period(0, uart_id, pause)?,
                        active_time(0, pause)?,
                        p.push_bot_led_set_frequency(0, uart_id, pause)?,
                    ],
                )
            }
            DeviceKind::Speaker(config) => {
                if config.start_frequency.is_some() == config.start_melody.is_some() {
                    return Err(ConfigurationError::SpeakerStartState);
                }
                let mut start_resume = vec![
                    p.push_bot_speaker_config_total_period(config.start_total_period, uart_id, start)?,
                    p.push_bot_speaker_config_active_time(config.start_active_time, uart_id, start)?,
                ];
                let mut pause_stop = vec![
                    p.push_bot_speaker_config_total_period(0, uart_id, pause)?,
                    p.push_bot_speaker_config_active_time(0, uart_id, pause)?,
                ];
                if let Some(frequency) = config.start_frequency {
                    start_resume.push(p.push_bot_speaker_set_tone(frequency, uart_id, start)?);
                    pause_stop.push(p.push_bot_speaker_set_tone(0, uart_id, pause)?);
                }
                if let Some(melody) = config.start_melody {
                    start_resume.push(p.push_bot_speaker_set_melody(melody, uart_id, start)?);
                    pause_stop.push(p.push_bot_speaker_set_melody(0, uart_id, pause)?);
                }
                (start_resume, pause_stop)
            }
            DeviceKind::Motor(_) => (
                vec![p.generic_motor_enable_disable(MOTOR_ENABLE, uart_id, start)],
                vec![p.generic_motor_enable_disable(0, uart_id, pause)],
            ),
            DeviceKind::Retina(config) => {
                let transmission =
                    RetinaTransmission::events_in_key(config.resolution).with_timestamps(config.timestamps);
                (
                    vec![
                        p.disable_retina_event_streaming(uart_id, start),
                        p.set_retina_transmission_key(config.routing_key, uart_id, start),
                        p.set_retina_transmission(transmission, uart_id, start, 0, 0)?,
                    ],
                    vec![p.disable_retina_event_streaming(uart_id, pause)],
                )
            }
            DeviceKind::Sensor(config) => (
                vec![p.poll_individual_sensor_continuously(config.sensor_id, config.poll_period_ms, start)],
                vec![p.turn_off_sensor_reporting(config.sensor_id, pause)],
            ),
        };

        Ok(Self {
            start_resume,
            pause_stop,
            timed: Vec::new(),
        })
    }
}

/// A robot peripheral bound to a protocol instance and a uart.
#[derive(Debug)]
pub struct Device {
    kind: DeviceKind,
    protocol: ProtocolHandle,
    uart_id: u8,
    commands: DeviceCommandSet,
    keys: Vec<(u32, CommandId)>,
    retina_format: Option<RetinaEventFormat>,
}

impl Device {
    /// Build the device and its command lists.
    ///
    /// The first device built on a protocol instance also gets the mode select
    /// command at the head of its start list.
    pub fn new(kind: DeviceKind, protocol: ProtocolHandle, uart_id: u8) -> Result<Self, ConfigurationError> {
        let retina_format = match kind {
            DeviceKind::Retina(config) => Some(RetinaEventFormat::new(
                config.resolution,
                config.polarity,
                config.timestamps,
            )?),
            _ => None,
        };

        let mut commands = DeviceCommandSet::build(&kind, &protocol, uart_id)?;
        let mut keys: Vec<_> = kind
            .command_ids()
            .iter()
            .map(|&id| (protocol.key(id, uart_id), id))
            .collect();

        if protocol.claim_configuration_command() {
            let mode_select = protocol.get_set_mode_command(SendTime::OnStart);
            keys.push((mode_select.key, CommandId::ChangeMode));
            commands.start_resume.insert(0, mode_select);
        }

        debug!(
            device = kind.name(),
            instance_key = protocol.instance_key(),
            start = commands.start_resume.len(),
            pause = commands.pause_stop.len(),
            "Device built"
        );

        Ok(Self {
            kind,
            protocol,
            uart_id,
            commands,
            keys,
            retina_format,
        })
    }

    pub fn kind(&self) -> &DeviceKind {
        &self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn protocol(&self) -> &MunichProtocol {
        &self.protocol
    }

    pub fn uart_id(&self) -> u8 {
        self.uart_id
    }

    pub fn start_resume_commands(&self) -> &[Command] {
        &self.commands.start_resume
    }

    pub fn pause_stop_commands(&self) -> &[Command] {
        &self.commands.pause_stop
    }

    pub fn timed_commands(&self) -> &[Command] {
        &self.commands.timed
    }

    pub fn command_set(&self) -> &DeviceCommandSet {
        &self.commands
    }

    /// Every key this device answers to, with the command it stands for.
    pub fn command_keys(&self) -> &[(u32, CommandId)] {
        &self.keys
    }

    /// The command a key of this device stands for.
    pub fn command_id(&self, key: u32) -> Option<CommandId> {
        self.keys.iter().find(|(own, _)| *own == key).map(|&(_, id)| id)
    }

    pub fn key(&self, id: CommandId) -> Option<u32> {
        self.keys.iter().find(|(_, own)| *own == id).map(|&(key, _)| key)
    }

    /// Event format of a retina device.
    pub fn retina_format(&self) -> Option<RetinaEventFormat> {
        self.retina_format
    }

    pub fn disable_retina_command_key(&self) -> Option<u32> {
        self.retina_format.and(self.key(CommandId::DisableRetina))
    }

    pub fn set_retina_command_key(&self) -> Option<u32> {
        self.retina_format.and(self.key(CommandId::RetinaTransmission))
    }
}

impl CommandKeySource for Device {
    fn key_for(&self, id: CommandId) -> Option<OwnedKey> {
        self.key(id).map(|command_key| OwnedKey {
            command_key,
            owning_instance_key: self.protocol.instance_key(),
        })
    }
}

impl CommandKeySource for [Device] {
    fn key_for(&self, id: CommandId) -> Option<OwnedKey> {
        self.iter().find_map(|device| device.key_for(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Mode;

    fn owned(instance_key: u32) -> ProtocolHandle {
        ProtocolHandle::Owned(MunichProtocol::with_instance_key(Mode::PushBot, instance_key))
    }

    #[test]
    fn test_laser_lists() {
        let laser = DeviceKind::Laser(LaserConfig {
            start_total_period: 100,
            start_active_time: 50,
            start_frequency: 10,
        });
        let device = Device::new(laser, owned(0), 0).unwrap();
        let start = device.start_resume_commands();
        assert_eq!(start.len(), 4);
        assert_eq!(start[0].payload, Some(Mode::PushBot as u32));
        assert_eq!(start[1].payload, Some(100));
        assert_eq!(start[3].key, (37 << 4) | 1);
        assert!(device.pause_stop_commands().iter().all(|c| c.payload == Some(0)));
        assert!(device.timed_commands().is_empty());
    }

    #[test]
    fn test_shared_protocol_sends_mode_once() {
        let shared = Arc::new(MunichProtocol::with_instance_key(Mode::PushBot, 1 << 11));
        let motor = Device::new(
            DeviceKind::Motor(MotorConfig::default()),
            ProtocolHandle::Shared(shared.clone()),
            0,
        )
        .unwrap();
        let laser = Device::new(DeviceKind::Laser(LaserConfig::default()), ProtocolHandle::Shared(shared), 0).unwrap();
        assert_eq!(motor.start_resume_commands().len(), 2);
        assert_eq!(laser.start_resume_commands().len(), 3);
        assert_eq!(motor.protocol().instance_key(), laser.protocol().instance_key());
    }

    #[test]
    fn test_speaker_start_state() {
        let both = SpeakerConfig {
            start_frequency: Some(440),
            start_melody: Some(2),
            ..SpeakerConfig::default()
        };
        assert!(matches!(
            Device::new(DeviceKind::Speaker(both), owned(0), 0),
            Err(ConfigurationError::SpeakerStartState)
        ));
        assert!(matches!(
            Device::new(DeviceKind::Speaker(SpeakerConfig::default()), owned(0), 0),
            Err(ConfigurationError::SpeakerStartState)
        ));
    }

    #[test]
    fn test_retina_lists_and_keys() {
        let config = RetinaConfig {
            routing_key: 0xfe00_0000,
            ..RetinaConfig::default()
        };
        let device = Device::new(DeviceKind::Retina(config), owned(3 << 11), 0).unwrap();
        let start = device.start_resume_commands();
        assert_eq!(start.len(), 4);
        assert_eq!(start[1].key, 3 << 11);
        assert_eq!(start[1].payload, None);
        assert_eq!(start[2].payload, Some(0xfe00_0000));
        assert_eq!(start[3].payload, Some(1 << 26));
        assert_eq!(device.pause_stop_commands(), &[start[1].with_send_time(SendTime::OnPause)]);
        assert_eq!(device.disable_retina_command_key(), Some(3 << 11));
        assert_eq!(device.set_retina_command_key(), Some((3 << 11) | 1));
    }

    #[test]
    fn test_non_retina_has_no_retina_keys() {
        let device = Device::new(DeviceKind::Sensor(SensorConfig::default()), owned(0), 0).unwrap();
        assert_eq!(device.disable_retina_command_key(), None);
        assert_eq!(device.pause_stop_commands()[0].payload, Some(8 << 27));
    }
}
