use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use strum_macros::{Display, IntoStaticStr};
use tracing::warn;

use crate::allocator::InstanceKeyAllocator;
use crate::command::{Command, SendTime};
use crate::constants::{
    BIAS_VALUE_OFFSET, OFFSET_FOR_SENSOR_TIME, PAYLOAD_NO_TIMESTAMPS, PAYLOAD_RETINA_NO_DOWN_SAMPLING_IN_PAYLOAD,
    SENSOR_ID_OFFSET,
};
use crate::error::ConfigurationError;
use crate::key::{UartOffset, encode};
use crate::retina::{RetinaResolution, TimestampSize};

/// Robot firmware modes selected by the `CHANGE_MODE` command.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive, Display, Serialize, Deserialize,
)]
#[repr(u32)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    ResetToDefault = 0,
    PushBot = 1,
    Spomnibot = 2,
    BallBalancer = 3,
    MyOrobotics = 4,
    Free = 5,
}

impl Mode {
    pub fn from_payload(payload: u32) -> Result<Self, ConfigurationError> {
        Mode::try_from(payload).map_err(|_| ConfigurationError::UnsupportedMode(payload))
    }
}

/// Payloads of the retina master/slave command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u32)]
pub enum MasterSlave {
    UseInternalCounter = 0,
    Slave = 1,
    MasterClockNotStarted = 2,
    MasterClockActive = 4,
}

/// Every command of the protocol. The discriminant indexes [`COMMAND_TABLE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CommandId {
    ConfigureMaster,
    ChangeMode,
    DisableRetina,
    RetinaTransmission,
    RetinaSetKey,
    SetTimestampCounter,
    MasterSlave,
    Bias,
    ResetRetina,
    SensorReportingOff,
    PollSensorsOnce,
    PollSensorsContinuously,
    MotorEnableDisable,
    MotorRunForPeriod,
    Motor0RawPermanent,
    Motor1RawPermanent,
    Motor0RawLeak,
    Motor1RawLeak,
    TimerATotalPeriod,
    TimerBTotalPeriod,
    TimerCTotalPeriod,
    TimerAChannel0Ratio,
    TimerAChannel1Ratio,
    TimerBChannel0Ratio,
    TimerBChannel1Ratio,
    TimerCChannel0Ratio,
    TimerCChannel1Ratio,
    QueryIoLines,
    SetOutputPattern,
    AddPayloadToOutput,
    RemovePayloadFromOutput,
    SetHighImpedance,
    LaserTotalPeriod,
    LaserActiveTime,
    LaserFrequency,
    LedTotalPeriod,
    LedBackActiveTime,
    LedFrontActiveTime,
    LedFrequency,
    SpeakerTotalPeriod,
    SpeakerActiveTime,
    SpeakerTone,
    SpeakerMelody,
    Motor0Permanent,
    Motor1Permanent,
    Motor0Leaky,
    Motor1Leaky,
}

impl CommandId {
    pub fn spec(self) -> &'static CommandSpec {
        &COMMAND_TABLE[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Static field values of one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub id: CommandId,
    /// Family (I field)
    pub family: u8,
    /// Sub-opcode (D field)
    pub sub_opcode: u8,
    /// Where the uart id goes, `None` if the command carries none
    pub uart: Option<UartOffset>,
    /// Only valid when the protocol is in push bot mode
    pub push_bot_only: bool,
}

const fn spec(id: CommandId, family: u8, sub_opcode: u8, uart: Option<UartOffset>, push_bot_only: bool) -> CommandSpec {
    CommandSpec {
        id,
        family,
        sub_opcode,
        uart,
        push_bot_only,
    }
}

const NONE: Option<UartOffset> = None;
const WIDE: Option<UartOffset> = Some(UartOffset::Wide);
const NARROW: Option<UartOffset> = Some(UartOffset::Narrow);

/// The protocol: family, sub-opcode and uart convention of every command.
pub static COMMAND_TABLE: [CommandSpec; 47] = [
    spec(CommandId::ConfigureMaster, 127, 0, NONE, false),
    spec(CommandId::ChangeMode, 127, 1, NONE, false),
    spec(CommandId::DisableRetina, 0, 0, WIDE, false),
    spec(CommandId::RetinaTransmission, 0, 1, WIDE, false),
    spec(CommandId::RetinaSetKey, 0, 2, WIDE, false),
    spec(CommandId::SetTimestampCounter, 0, 3, WIDE, false),
    spec(CommandId::MasterSlave, 0, 4, WIDE, false),
    spec(CommandId::Bias, 0, 5, WIDE, false),
    spec(CommandId::ResetRetina, 0, 7, WIDE, false),
    spec(CommandId::SensorReportingOff, 1, 0, NONE, false),
    spec(CommandId::PollSensorsOnce, 1, 1, NONE, false),
    spec(CommandId::PollSensorsContinuously, 1, 2, NONE, false),
    spec(CommandId::MotorEnableDisable, 2, 0, WIDE, false),
    spec(CommandId::MotorRunForPeriod, 2, 1, WIDE, false),
    spec(CommandId::Motor0RawPermanent, 2, 4, WIDE, false),
    spec(CommandId::Motor1RawPermanent, 2, 5, WIDE, false),
    spec(CommandId::Motor0RawLeak, 2, 6, WIDE, false),
    spec(CommandId::Motor1RawLeak, 2, 7, WIDE, false),
    spec(CommandId::TimerATotalPeriod, 3, 0, WIDE, false),
    spec(CommandId::TimerBTotalPeriod, 3, 2, WIDE, false),
    spec(CommandId::TimerCTotalPeriod, 3, 4, WIDE, false),
    spec(CommandId::TimerAChannel0Ratio, 4, 0, WIDE, false),
    spec(CommandId::TimerAChannel1Ratio, 4, 1, WIDE, false),
    spec(CommandId::TimerBChannel0Ratio, 4, 2, WIDE, false),
    spec(CommandId::TimerBChannel1Ratio, 4, 3, WIDE, false),
    spec(CommandId::TimerCChannel0Ratio, 4, 4, WIDE, false),
    spec(CommandId::TimerCChannel1Ratio, 4, 5, WIDE, false),
    spec(CommandId::QueryIoLines, 5, 0, NONE, false),
    spec(CommandId::SetOutputPattern, 5, 1, NONE, false),
    spec(CommandId::AddPayloadToOutput, 5, 2, NONE, false),
    spec(CommandId::RemovePayloadFromOutput, 5, 3, NONE, false),
    spec(CommandId::SetHighImpedance, 5, 4, NONE, false),
    spec(CommandId::LaserTotalPeriod, 4, 0, WIDE, true),
    spec(CommandId::LaserActiveTime, 5, 0, WIDE, true),
    spec(CommandId::LaserFrequency, 37, 1, NARROW, true),
    spec(CommandId::LedTotalPeriod, 4, 4, WIDE, true),
    spec(CommandId::LedBackActiveTime, 5, 4, WIDE, true),
    spec(CommandId::LedFrontActiveTime, 5, 5, WIDE, true),
    spec(CommandId::LedFrequency, 37, 0, NARROW, true),
    spec(CommandId::SpeakerTotalPeriod, 4, 2, WIDE, true),
    spec(CommandId::SpeakerActiveTime, 5, 2, WIDE, true),
    spec(CommandId::SpeakerTone, 36, 0, NARROW, true),
    spec(CommandId::SpeakerMelody, 36, 1, NARROW, true),
    spec(CommandId::Motor0Permanent, 32, 0, WIDE, true),
    spec(CommandId::Motor1Permanent, 32, 1, WIDE, true),
    spec(CommandId::Motor0Leaky, 32, 2, WIDE, true),
    spec(CommandId::Motor1Leaky, 32, 3, WIDE, true),
];

/// Retina transmission settings for [`MunichProtocol::set_retina_transmission`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetinaTransmission {
    /// Events encoded in the key (`true`) or carried in the payload
    pub events_in_key: bool,
    /// Total pixel count: 128*128, 64*64, 32*32 or 16*16
    pub retina_pixels: u32,
    /// Timestamp carried in the payload, if any
    pub timestamps: Option<TimestampSize>,
}

impl RetinaTransmission {
    pub fn events_in_key(resolution: RetinaResolution) -> Self {
        Self {
            events_in_key: true,
            retina_pixels: resolution.pixels(),
            timestamps: None,
        }
    }

    pub fn with_timestamps(mut self, timestamps: Option<TimestampSize>) -> Self {
        self.timestamps = timestamps;
        self
    }
}

/// One instance of the Munich IO SpiNNaker-link protocol.
///
/// The instance key is OR'd into every key this protocol builds, so devices
/// on separate instances never alias. Devices may share one instance; the
/// mode select command is then emitted only by the first of them.
#[derive(Debug)]
pub struct MunichProtocol {
    mode: Mode,
    instance_key: u32,
    configuration_sent: AtomicBool,
}

impl MunichProtocol {
    pub fn new(mode: Mode, allocator: &InstanceKeyAllocator) -> Self {
        Self::with_instance_key(mode, allocator.allocate_key())
    }

    pub fn with_instance_key(mode: Mode, instance_key: u32) -> Self {
        Self {
            mode,
            instance_key,
            configuration_sent: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn instance_key(&self) -> u32 {
        self.instance_key
    }

    /// Whether a device already put the mode select command in its start list.
    pub fn has_set_off_configuration_command(&self) -> bool {
        self.configuration_sent.load(Ordering::Acquire)
    }

    /// Mark the mode select command as taken. Returns `true` for the first caller only.
    pub(crate) fn claim_configuration_command(&self) -> bool {
        !self.configuration_sent.swap(true, Ordering::AcqRel)
    }

    /// Key of `id` for this instance and uart.
    pub fn key(&self, id: CommandId, uart_id: u8) -> u32 {
        let spec = id.spec();
        let (channel, convention) = match spec.uart {
            Some(convention) => (uart_id, convention),
            None => (0, UartOffset::Wide),
        };
        encode(spec.family, spec.sub_opcode, channel, 0, convention) | self.instance_key
    }

    fn command(&self, id: CommandId, uart_id: u8, payload: Option<u32>, time: SendTime) -> Command {
        Command::new(self.key(id, uart_id), payload, time)
    }

    fn push_bot_command(
        &self,
        id: CommandId,
        uart_id: u8,
        payload: u32,
        time: SendTime,
    ) -> Result<Command, ConfigurationError> {
        if id.spec().push_bot_only && self.mode != Mode::PushBot {
            return Err(ConfigurationError::InvalidForMode {
                command: id.name(),
                mode: self.mode,
            });
        }
        Ok(self.command(id, uart_id, Some(payload), time))
    }

    pub fn get_configure_master_key_command(&self, new_key: u32, time: SendTime) -> Command {
        self.command(CommandId::ConfigureMaster, 0, Some(new_key), time)
    }

    pub fn get_set_mode_command(&self, time: SendTime) -> Command {
        self.command(CommandId::ChangeMode, 0, Some(self.mode.into()), time)
    }

    pub fn set_retina_transmission_key(&self, new_key: u32, uart_id: u8, time: SendTime) -> Command {
        self.command(CommandId::RetinaSetKey, uart_id, Some(new_key), time)
    }

    pub fn disable_retina_event_streaming(&self, uart_id: u8, time: SendTime) -> Command {
        self.command(CommandId::DisableRetina, uart_id, None, time)
    }

    pub fn master_slave(&self, setting: MasterSlave, uart_id: u8, time: SendTime) -> Command {
        self.command(CommandId::MasterSlave, uart_id, Some(setting.into()), time)
    }

    pub fn bias_values(&self, bias_id: u8, bias_value: u32, uart_id: u8, time: SendTime) -> Command {
        let payload = u32::from(bias_id) | (bias_value << BIAS_VALUE_OFFSET);
        self.command(CommandId::Bias, uart_id, Some(payload), time)
    }

    pub fn reset_retina(&self, uart_id: u8, time: SendTime) -> Command {
        self.command(CommandId::ResetRetina, uart_id, None, time)
    }

    pub fn turn_off_sensor_reporting(&self, sensor_id: u8, time: SendTime) -> Command {
        self.command(CommandId::SensorReportingOff, 0, Some(sensor_payload(sensor_id)), time)
    }

    pub fn poll_sensors_once(&self, sensor_id: u8, time: SendTime) -> Command {
        self.command(CommandId::PollSensorsOnce, 0, Some(sensor_payload(sensor_id)), time)
    }

    pub fn poll_individual_sensor_continuously(&self, sensor_id: u8, time_in_ms: u32, time: SendTime) -> Command {
        let payload = sensor_payload(sensor_id) | time_in_ms.wrapping_shl(OFFSET_FOR_SENSOR_TIME);
        self.command(CommandId::PollSensorsContinuously, 0, Some(payload), time)
    }

    pub fn generic_motor_enable_disable(&self, enable: u32, uart_id: u8, time: SendTime) -> Command {
        self.command(CommandId::MotorEnableDisable, uart_id, Some(enable), time)
    }

    pub fn generic_motor_total_period_duration(&self, time_in_ms: u32, uart_id: u8, time: SendTime) -> Command {
        self.command(CommandId::MotorRunForPeriod, uart_id, Some(time_in_ms), time)
    }

    pub fn generic_motor0_raw_output_permanent(&self, pwm_signal: u32, uart_id: u8, time: SendTime) -> Command {
        self.command(CommandId::Motor0RawPermanent, uart_id, Some(pwm_signal), time)
    }

    pub fn generic_motor1_raw_output_permanent(&self, pwm_signal: u32, uart_id: u8, time: SendTime) -> Command {
        self.command(CommandId::Motor1RawPermanent, uart_id, Some(pwm_signal), time)
    }

    pub fn generic_motor0_raw_output_leak_to_0(&self, pwm_signal: u32, uart_id: u8, time: SendTime) -> Command {
        self.command(CommandId::Motor0RawLeak, uart_id, Some(pwm_signal), time)
    }

    pub fn generic_motor1_raw_output_leak_to_0(&self, pwm_signal: u32, uart_id: u8, time: SendTime) -> Command {
        self.command(CommandId::Motor1RawLeak, uart_id, Some(pwm_signal), time)
    }

    /// Total period of PWM timer `timer` (A, B or C).
    pub fn pwm_pin_output_timer_duration(
        &self,
        timer: PwmTimer,
        timer_period: u32,
        uart_id: u8,
        time: SendTime,
    ) -> Command {
        let id = match timer {
            PwmTimer::A => CommandId::TimerATotalPeriod,
            PwmTimer::B => CommandId::TimerBTotalPeriod,
            PwmTimer::C => CommandId::TimerCTotalPeriod,
        };
        self.command(id, uart_id, Some(timer_period), time)
    }

    /// Active period of one channel (0 or 1) of PWM timer `timer`.
    pub fn pwm_pin_output_channel_ratio(
        &self,
        timer: PwmTimer,
        channel: PwmChannel,
        timer_period: u32,
        uart_id: u8,
        time: SendTime,
    ) -> Command {
        let id = match (timer, channel) {
            (PwmTimer::A, PwmChannel::Zero) => CommandId::TimerAChannel0Ratio,
            (PwmTimer::A, PwmChannel::One) => CommandId::TimerAChannel1Ratio,
            (PwmTimer::B, PwmChannel::Zero) => CommandId::TimerBChannel0Ratio,
            (PwmTimer::B, PwmChannel::One) => CommandId::TimerBChannel1Ratio,
            (PwmTimer::C, PwmChannel::Zero) => CommandId::TimerCChannel0Ratio,
            (PwmTimer::C, PwmChannel::One) => CommandId::TimerCChannel1Ratio,
        };
        self.command(id, uart_id, Some(timer_period), time)
    }

    pub fn query_state_of_io_lines(&self, time: SendTime) -> Command {
        self.command(CommandId::QueryIoLines, 0, None, time)
    }

    pub fn set_output_pattern_for_payload(&self, payload: u32, time: SendTime) -> Command {
        self.command(CommandId::SetOutputPattern, 0, Some(payload), time)
    }

    pub fn add_payload_logic_to_current_output(&self, payload: u32, time: SendTime) -> Command {
        self.command(CommandId::AddPayloadToOutput, 0, Some(payload), time)
    }

    pub fn remove_payload_logic_to_current_output(&self, payload: u32, time: SendTime) -> Command {
        self.command(CommandId::RemovePayloadFromOutput, 0, Some(payload), time)
    }

    pub fn set_payload_pins_to_high_impedance(&self, payload: u32, time: SendTime) -> Command {
        self.command(CommandId::SetHighImpedance, 0, Some(payload), time)
    }

    pub fn push_bot_laser_config_total_period(
        &self,
        total_period: u32,
        uart_id: u8,
        time: SendTime,
    ) -> Result<Command, ConfigurationError> {
        self.push_bot_command(CommandId::LaserTotalPeriod, uart_id, total_period, time)
    }

    pub fn push_bot_laser_config_active_time(
        &self,
        active_time: u32,
        uart_id: u8,
        time: SendTime,
    ) -> Result<Command, ConfigurationError> {
        self.push_bot_command(CommandId::LaserActiveTime, uart_id, active_time, time)
    }

    pub fn push_bot_laser_set_frequency(
        &self,
        frequency: u32,
        uart_id: u8,
        time: SendTime,
    ) -> Result<Command, ConfigurationError> {
        self.push_bot_command(CommandId::LaserFrequency, uart_id, frequency, time)
    }

    pub fn push_bot_speaker_config_total_period(
        &self,
        total_period: u32,
        uart_id: u8,
        time: SendTime,
    ) -> Result<Command, ConfigurationError> {
        self.push_bot_command(CommandId::SpeakerTotalPeriod, uart_id, total_period, time)
    }

    pub fn push_bot_speaker_config_active_time(
        &self,
        active_time: u32,
        uart_id: u8,
        time: SendTime,
    ) -> Result<Command, ConfigurationError> {
        self.push_bot_command(CommandId::SpeakerActiveTime, uart_id, active_time, time)
    }

    pub fn push_bot_speaker_set_tone(
        &self,
        frequency: u32,
        uart_id: u8,
        time: SendTime,
    ) -> Result<Command, ConfigurationError> {
        self.push_bot_command(CommandId::SpeakerTone, uart_id, frequency, time)
    }

    pub fn push_bot_speaker_set_melody(
        &self,
        melody: u32,
        uart_id: u8,
        time: SendTime,
    ) -> Result<Command, ConfigurationError> {
        self.push_bot_command(CommandId::SpeakerMelody, uart_id, melody, time)
    }

    pub fn push_bot_led_total_period(
        &self,
        total_period: u32,
        uart_id: u8,
        time: SendTime,
    ) -> Result<Command, ConfigurationError> {
        self.push_bot_command(CommandId::LedTotalPeriod, uart_id, total_period, time)
    }

    pub fn push_bot_led_back_active_time(
        &self,
        active_time: u32,
        uart_id: u8,
        time: SendTime,
    ) -> Result<Command, ConfigurationError> {
        self.push_bot_command(CommandId::LedBackActiveTime, uart_id, active_time, time)
    }

    pub fn push_bot_led_front_active_time(
        &self,
        active_time: u32,
        uart_id: u8,
        time: SendTime,
    ) -> Result<Command, ConfigurationError> {
        self.push_bot_command(CommandId::LedFrontActiveTime, uart_id, active_time, time)
    }

    pub fn push_bot_led_set_frequency(
        &self,
        frequency: u32,
        uart_id: u8,
        time: SendTime,
    ) -> Result<Command, ConfigurationError> {
        self.push_bot_command(CommandId::LedFrequency, uart_id, frequency, time)
    }

    pub fn push_bot_motor_0_permanent(
        &self,
        velocity: u32,
        uart_id: u8,
        time: SendTime,
    ) -> Result<Command, ConfigurationError> {
        self.push_bot_command(CommandId::Motor0Permanent, uart_id, velocity, time)
    }

    pub fn push_bot_motor_1_permanent(
        &self,
        velocity: u32,
        uart_id: u8,
        time: SendTime,
    ) -> Result<Command, ConfigurationError> {
        self.push_bot_command(CommandId::Motor1Permanent, uart_id, velocity, time)
    }

    pub fn push_bot_motor_0_leaking_towards_zero(
        &self,
        velocity: u32,
        uart_id: u8,
        time: SendTime,
    ) -> Result<Command, ConfigurationError> {
        self.push_bot_command(CommandId::Motor0Leaky, uart_id, velocity, time)
    }

    pub fn push_bot_motor_1_leaking_towards_zero(
        &self,
        velocity: u32,
        uart_id: u8,
        time: SendTime,
    ) -> Result<Command, ConfigurationError> {
        self.push_bot_command(CommandId::Motor1Leaky, uart_id, velocity, time)
    }

    /// Configure how retina events are streamed.
    ///
    /// With events in the key the payload selects the resolution and the
    /// timestamp size. With events in the payload no timestamps are allowed.
    pub fn set_retina_transmission(
        &self,
        transmission: RetinaTransmission,
        uart_id: u8,
        time: SendTime,
        repeat: u32,
        delay_ms: u32,
    ) -> Result<Command, ConfigurationError> {
        let payload = if transmission.events_in_key {
            let resolution = RetinaResolution::from_pixels(transmission.retina_pixels)?;
            let timestamps = transmission
                .timestamps
                .map_or(PAYLOAD_NO_TIMESTAMPS, TimestampSize::payload);
            timestamps | resolution.payload()
        } else {
            warn!(
                "Retina events carried in payloads need an adaptor model between the device and the \
                 receiving population"
            );
            if transmission.timestamps.is_some() {
                return Err(ConfigurationError::TimestampsWithPayloadEvents);
            }
            PAYLOAD_NO_TIMESTAMPS | PAYLOAD_RETINA_NO_DOWN_SAMPLING_IN_PAYLOAD
        };

        Ok(self
            .command(CommandId::RetinaTransmission, uart_id, Some(payload), time)
            .with_repeats(repeat, delay_ms))
    }
}

fn sensor_payload(sensor_id: u8) -> u32 {
    u32::from(sensor_id) << SENSOR_ID_OFFSET
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmTimer {
    A,
    B,
    C,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmChannel {
    Zero,
    One,
}
