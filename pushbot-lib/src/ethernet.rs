//! Text form of the robot commands, as spoken over the WiFi link.

use crate::constants::{MAX_TEXT_VELOCITY, OFFSET_FOR_TIMESTAMPS};
use crate::protocol::CommandId;
use crate::retina::TimestampSize;

/// Formatter for the line based protocol. Every message ends in `\n`.
pub struct EthernetProtocol;

fn clamp_velocity(velocity: i32) -> i32 {
    velocity.clamp(-MAX_TEXT_VELOCITY, MAX_TEXT_VELOCITY)
}

impl EthernetProtocol {
    pub fn enable_retina() -> String {
        "E+\n".to_string()
    }

    pub fn disable_retina() -> String {
        "E-\n".to_string()
    }

    /// Event format selection; `!E0` streams bare addresses.
    pub fn set_retina_transmission(timestamps: Option<TimestampSize>) -> String {
        Self::retina_event_format(timestamps.map_or(0, TimestampSize::code))
    }

    fn retina_event_format(code: u32) -> String {
        format!("!E{code}\n")
    }

    pub fn enable_motor() -> String {
        "!M+\n".to_string()
    }

    pub fn disable_motor() -> String {
        "!M-\n".to_string()
    }

    pub fn motor_0_permanent_velocity(velocity: i32) -> String {
        format!("!MV0={}\n", clamp_velocity(velocity))
    }

    pub fn motor_1_permanent_velocity(velocity: i32) -> String {
        format!("!MV1={}\n", clamp_velocity(velocity))
    }

    pub fn motor_0_leaky_velocity(velocity: i32) -> String {
        format!("!MVD0={}\n", clamp_velocity(velocity))
    }

    pub fn motor_1_leaky_velocity(velocity: i32) -> String {
        format!("!MVD1={}\n", clamp_velocity(velocity))
    }

    pub fn laser_total_period(total_period: u32) -> String {
        format!("!PA={total_period}\n")
    }

    pub fn laser_active_time(active_time: u32) -> String {
        format!("!PA0={active_time}\n")
    }

    pub fn laser_frequency(frequency: u32) -> String {
        format!("!PA1={frequency}\n")
    }

    pub fn speaker_total_period(total_period: u32) -> String {
        format!("!PB={total_period}\n")
    }

    pub fn speaker_active_time(active_time: u32) -> String {
        format!("!PB0={active_time}\n")
    }

    pub fn speaker_frequency(frequency: u32) -> String {
        format!("!PB1={frequency}\n")
    }

    pub fn led_total_period(total_period: u32) -> String {
        format!("!PC={total_period}\n")
    }

    /// Front and back LEDs share one active time on the text link.
    pub fn led_active_time(active_time: u32) -> String {
        format!("!PC0={active_time}\n")
    }

    pub fn led_frequency(frequency: u32) -> String {
        format!("!PC1={frequency}\n")
    }

    /// Text for a command, or `None` if the text link has no equivalent.
    ///
    /// Payloads of velocity commands are read as signed values.
    pub fn translate(id: CommandId, payload: Option<u32>) -> Option<String> {
        let value = payload.unwrap_or(0);
        let velocity = value as i32;
        let text = match id {
            CommandId::DisableRetina => Self::disable_retina(),
            CommandId::RetinaTransmission => {
                let code = (value >> OFFSET_FOR_TIMESTAMPS) & 0x7;
                Self::retina_event_format(code) + &Self::enable_retina()
            }
            CommandId::MotorEnableDisable if value != 0 => Self::enable_motor(),
            CommandId::MotorEnableDisable => Self::disable_motor(),
            CommandId::Motor0Permanent => Self::motor_0_permanent_velocity(velocity),
            CommandId::Motor1Permanent => Self::motor_1_permanent_velocity(velocity),
            CommandId::Motor0Leaky => Self::motor_0_leaky_velocity(velocity),
            CommandId::Motor1Leaky => Self::motor_1_leaky_velocity(velocity),
            CommandId::LaserTotalPeriod => Self::laser_total_period(value),
            CommandId::LaserActiveTime => Self::laser_active_time(value),
            CommandId::LaserFrequency => Self::laser_frequency(value),
            CommandId::SpeakerTotalPeriod => Self::speaker_total_period(value),
            CommandId::SpeakerActiveTime => Self::speaker_active_time(value),
            CommandId::SpeakerTone => Self::speaker_frequency(value),
            CommandId::LedTotalPeriod => Self::led_total_period(value),
            CommandId::LedFrontActiveTime | CommandId::LedBackActiveTime => Self::led_active_time(value),
            CommandId::LedFrequency => Self::led_frequency(value),
            _ => return None,
        };
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_velocity_is_signed_and_clamped() {
        assert_eq!(EthernetProtocol::translate(CommandId::Motor0Permanent, Some(50)).as_deref(), Some("!MV0=50\n"));
        assert_eq!(
            EthernetProtocol::translate(CommandId::Motor1Leaky, Some((-20i32) as u32)).as_deref(),
            Some("!MVD1=-20\n")
        );
        assert_eq!(EthernetProtocol::motor_0_leaky_velocity(250), "!MVD0=100\n");
        assert_eq!(EthernetProtocol::motor_1_permanent_velocity(-101), "!MV1=-100\n");
    }

    #[test]
    fn test_retina_commands() {
        assert_eq!(EthernetProtocol::translate(CommandId::DisableRetina, None).as_deref(), Some("E-\n"));
        assert_eq!(
            EthernetProtocol::translate(CommandId::RetinaTransmission, Some(1 << 26)).as_deref(),
            Some("!E0\nE+\n")
        );
        assert_eq!(
            EthernetProtocol::translate(CommandId::RetinaTransmission, Some((3 << 29) | (1 << 26))).as_deref(),
            Some("!E3\nE+\n")
        );
        assert_eq!(EthernetProtocol::set_retina_transmission(Some(TimestampSize::FourBytes)), "!E4\n");
    }

    #[test]
    fn test_motor_enable_and_peripherals() {
        assert_eq!(EthernetProtocol::translate(CommandId::MotorEnableDisable, Some(1)).as_deref(), Some("!M+\n"));
        assert_eq!(EthernetProtocol::translate(CommandId::MotorEnableDisable, Some(0)).as_deref(), Some("!M-\n"));
        assert_eq!(EthernetProtocol::translate(CommandId::LaserFrequency, Some(7)).as_deref(), Some("!PA1=7\n"));
        assert_eq!(EthernetProtocol::translate(CommandId::SpeakerTone, Some(440)).as_deref(), Some("!PB1=440\n"));
        assert_eq!(EthernetProtocol::translate(CommandId::LedBackActiveTime, Some(3)).as_deref(), Some("!PC0=3\n"));
    }

    #[test]
    fn test_commands_without_text_form() {
        for id in [
            CommandId::SpeakerMelody,
            CommandId::ChangeMode,
            CommandId::RetinaSetKey,
            CommandId::PollSensorsContinuously,
            CommandId::SensorReportingOff,
        ] {
            assert_eq!(EthernetProtocol::translate(id, Some(1)), None, "{id} should have no text form");
        }
    }
}
