use bytes::Buf;
use modular_bitfield::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::constants::{
    OFFSET_FOR_TIMESTAMPS, PAYLOAD_RETINA_16_DOWN_SAMPLING, PAYLOAD_RETINA_32_DOWN_SAMPLING,
    PAYLOAD_RETINA_64_DOWN_SAMPLING, PAYLOAD_RETINA_NO_DOWN_SAMPLING,
};
use crate::error::{ConfigurationError, ProtocolError};

/// Size of the address part of a push bot retina frame
pub const ADDRESS_BYTES: usize = 2;

/// Bit of an FPGA retina key holding the polarity, for every resolution
const FPGA_POLARITY_BIT: u32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum RetinaResolution {
    Native128,
    Downsample64,
    Downsample32,
    Downsample16,
}

impl RetinaResolution {
    /// Pixels per row and column
    pub const fn side(self) -> u32 {
        match self {
            RetinaResolution::Native128 => 128,
            RetinaResolution::Downsample64 => 64,
            RetinaResolution::Downsample32 => 32,
            RetinaResolution::Downsample16 => 16,
        }
    }

    pub const fn pixels(self) -> u32 {
        self.side() * self.side()
    }

    pub const fn coordinate_bits(self) -> u32 {
        self.side().trailing_zeros()
    }

    /// Down sampling bits of the retina transmission payload.
    pub const fn payload(self) -> u32 {
        match self {
            RetinaResolution::Native128 => PAYLOAD_RETINA_NO_DOWN_SAMPLING,
            RetinaResolution::Downsample64 => PAYLOAD_RETINA_64_DOWN_SAMPLING,
            RetinaResolution::Downsample32 => PAYLOAD_RETINA_32_DOWN_SAMPLING,
            RetinaResolution::Downsample16 => PAYLOAD_RETINA_16_DOWN_SAMPLING,
        }
    }

    pub fn from_side(side: u32) -> Result<Self, ConfigurationError> {
        match side {
            128 => Ok(RetinaResolution::Native128),
            64 => Ok(RetinaResolution::Downsample64),
            32 => Ok(RetinaResolution::Downsample32),
            16 => Ok(RetinaResolution::Downsample16),
            other => Err(ConfigurationError::UnsupportedResolution(other.saturating_mul(other))),
        }
    }

    pub fn from_pixels(pixels: u32) -> Result<Self, ConfigurationError> {
        [
            RetinaResolution::Native128,
            RetinaResolution::Downsample64,
            RetinaResolution::Downsample32,
            RetinaResolution::Downsample16,
        ]
        .into_iter()
        .find(|resolution| resolution.pixels() == pixels)
        .ok_or(ConfigurationError::UnsupportedResolution(pixels))
    }
}

impl TryFrom<u32> for RetinaResolution {
    type Error = ConfigurationError;

    fn try_from(side: u32) -> Result<Self, Self::Error> {
        Self::from_side(side)
    }
}

impl From<RetinaResolution> for u32 {
    fn from(resolution: RetinaResolution) -> Self {
        resolution.side()
    }
}

/// Which events a retina device turns into spikes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetinaPolarity {
    /// Only positive (ON) events
    Up,
    /// Only negative (OFF) events
    Down,
    /// Both, positive events on the upper half of the neuron range
    #[default]
    Merged,
}

/// Timestamp carried after each retina event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSize {
    Delta,
    TwoBytes,
    ThreeBytes,
    FourBytes,
}

impl TimestampSize {
    /// Value of the timestamp field (0 is "no timestamps").
    pub const fn code(self) -> u32 {
        match self {
            TimestampSize::Delta => 1,
            TimestampSize::TwoBytes => 2,
            TimestampSize::ThreeBytes => 3,
            TimestampSize::FourBytes => 4,
        }
    }

    pub const fn payload(self) -> u32 {
        self.code() << OFFSET_FOR_TIMESTAMPS
    }

    /// Bytes following each event, `None` for variable length delta stamps.
    pub const fn frame_bytes(self) -> Option<usize> {
        match self {
            TimestampSize::Delta => None,
            TimestampSize::TwoBytes => Some(2),
            TimestampSize::ThreeBytes => Some(3),
            TimestampSize::FourBytes => Some(4),
        }
    }
}

/// Address bytes of a push bot retina event: `1yyyyyyy pxxxxxxx`.
#[bitfield(bytes = 2)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetinaAddress {
    pub y: B7,
    pub marker: bool,
    pub x: B7,
    pub polarity: bool,
}

/// One decoded retina event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetinaEvent {
    pub neuron_index: u32,
    pub polarity: bool,
    pub x: u32,
    pub y: u32,
    pub timestamp: Option<u32>,
}

/// How events arrive from the robot and how they map onto neurons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetinaEventFormat {
    resolution: RetinaResolution,
    polarity: RetinaPolarity,
    timestamps: Option<TimestampSize>,
}

impl Default for RetinaEventFormat {
    fn default() -> Self {
        Self {
            resolution: RetinaResolution::Native128,
            polarity: RetinaPolarity::Merged,
            timestamps: None,
        }
    }
}

impl RetinaEventFormat {
    pub fn new(
        resolution: RetinaResolution,
        polarity: RetinaPolarity,
        timestamps: Option<TimestampSize>,
    ) -> Result<Self, ConfigurationError> {
        if let Some(size) = timestamps
            && size.frame_bytes().is_none()
        {
            return Err(ConfigurationError::UnsupportedTimestamps(format!(
                "{size} timestamps have no fixed frame size"
            )));
        }
        Ok(Self {
            resolution,
            polarity,
            timestamps,
        })
    }

    pub fn resolution(&self) -> RetinaResolution {
        self.resolution
    }

    pub fn polarity(&self) -> RetinaPolarity {
        self.polarity
    }

    pub fn timestamps(&self) -> Option<TimestampSize> {
        self.timestamps
    }

    /// Bytes per event on the wire.
    pub fn frame_size(&self) -> usize {
        ADDRESS_BYTES + self.timestamps.and_then(TimestampSize::frame_bytes).unwrap_or(0)
    }

    /// Neurons needed to receive every event this format produces.
    pub fn n_neurons(&self) -> u32 {
        match self.polarity {
            RetinaPolarity::Merged => self.resolution.pixels() * 2,
            RetinaPolarity::Up | RetinaPolarity::Down => self.resolution.pixels(),
        }
    }

    /// Decode one frame of exactly [`frame_size`](Self::frame_size) bytes.
    ///
    /// Returns `Ok(None)` for events removed by the polarity filter.
    pub fn decode(&self, frame: &[u8]) -> Result<Option<RetinaEvent>, ProtocolError> {
        let Some((address, mut timestamp_bytes)) = frame.split_first_chunk::<ADDRESS_BYTES>() else {
            return Err(malformed(frame, "frame shorter than its address".to_string()));
        };
        if frame.len() != self.frame_size() {
            return Err(malformed(
                frame,
                format!("expected {} bytes, got {}", self.frame_size(), frame.len()),
            ));
        }

        let address = RetinaAddress::from_bytes(*address);
        let side = self.resolution.side();
        let (x, y) = (u32::from(address.x()), u32::from(address.y()));
        if x >= side || y >= side {
            return Err(malformed(
                frame,
                format!("coordinate ({x}, {y}) outside a {side}x{side} retina"),
            ));
        }

        let polarity = address.polarity();
        let keep = match self.polarity {
            RetinaPolarity::Up => polarity,
            RetinaPolarity::Down => !polarity,
            RetinaPolarity::Merged => true,
        };
        if !keep {
            return Ok(None);
        }

        let mut neuron_index = x * side + y;
        if self.polarity == RetinaPolarity::Merged && polarity {
            neuron_index += self.resolution.pixels();
        }

        let timestamp = if timestamp_bytes.is_empty() {
            None
        } else {
            let len = timestamp_bytes.len();
            Some(timestamp_bytes.get_uint(len) as u32)
        };

        Ok(Some(RetinaEvent {
            neuron_index,
            polarity,
            x,
            y,
            timestamp,
        }))
    }
}

fn malformed(frame: &[u8], reason: String) -> ProtocolError {
    ProtocolError::MalformedFrame {
        bytes: frame.to_vec(),
        reason,
    }
}

fn coordinate_mask(resolution: RetinaResolution) -> u32 {
    resolution.side() - 1
}

/// Row of an event key from the external FPGA retina.
pub fn get_y_from_fpga_retina(key: u32, resolution: RetinaResolution) -> u32 {
    key & coordinate_mask(resolution)
}

/// Column of an event key from the external FPGA retina.
pub fn get_x_from_fpga_retina(key: u32, resolution: RetinaResolution) -> u32 {
    (key >> resolution.coordinate_bits()) & coordinate_mask(resolution)
}

pub fn get_spike_value_from_fpga_retina(key: u32, _resolution: RetinaResolution) -> u32 {
    (key >> FPGA_POLARITY_BIT) & 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_native_frame() {
        let format = RetinaEventFormat::default();
        let event = format.decode(&[0x81, 0x41]).unwrap().unwrap();
        assert_eq!((event.x, event.y, event.polarity), (0x41, 1, false));
        assert_eq!(event.neuron_index, 0x41 * 128 + 1);

        let event = format.decode(&[0x85, 0x82]).unwrap().unwrap();
        assert!(event.polarity);
        assert_eq!(event.neuron_index, 2 * 128 + 5 + 128 * 128);
    }

    #[test]
    fn test_out_of_range_coordinate_is_malformed() {
        let format = RetinaEventFormat::new(RetinaResolution::Downsample32, RetinaPolarity::Merged, None).unwrap();
        assert!(format.decode(&[0x9f, 0x1f]).unwrap().is_some());
        let err = format.decode(&[0x80, 0x20]).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame { .. }), "{err}");
    }

    #[test]
    fn test_polarity_filter() {
        let up = RetinaEventFormat::new(RetinaResolution::Downsample16, RetinaPolarity::Up, None).unwrap();
        assert_eq!(up.decode(&[0x83, 0x04]).unwrap(), None);
        let event = up.decode(&[0x83, 0x84]).unwrap().unwrap();
        assert_eq!(event.neuron_index, 4 * 16 + 3);
        assert_eq!(up.n_neurons(), 256);
    }

    #[test]
    fn test_timestamped_frames() {
        let format =
            RetinaEventFormat::new(RetinaResolution::Native128, RetinaPolarity::Merged, Some(TimestampSize::ThreeBytes))
                .unwrap();
        assert_eq!(format.frame_size(), 5);
        let event = format.decode(&[0x80, 0x00, 0x01, 0x02, 0x03]).unwrap().unwrap();
        assert_eq!(event.timestamp, Some(0x010203));

        assert!(matches!(
            RetinaEventFormat::new(RetinaResolution::Native128, RetinaPolarity::Merged, Some(TimestampSize::Delta)),
            Err(ConfigurationError::UnsupportedTimestamps(_))
        ));
    }

    #[test]
    fn test_fpga_key_tables() {
        let key = (1 << 14) | (5 << 7) | 9;
        assert_eq!(get_y_from_fpga_retina(key, RetinaResolution::Native128), 9);
        assert_eq!(get_x_from_fpga_retina(key, RetinaResolution::Native128), 5);
        assert_eq!(get_spike_value_from_fpga_retina(key, RetinaResolution::Native128), 1);

        let key = (3 << 4) | 0xf;
        assert_eq!(get_y_from_fpga_retina(key, RetinaResolution::Downsample16), 0xf);
        assert_eq!(get_x_from_fpga_retina(key, RetinaResolution::Downsample16), 3);
        assert_eq!(get_x_from_fpga_retina(0x3f << 6, RetinaResolution::Downsample64), 0x3f);
    }

    #[test]
    fn test_resolution_from_pixels() {
        assert_eq!(RetinaResolution::from_pixels(64 * 64), Ok(RetinaResolution::Downsample64));
        assert_eq!(
            RetinaResolution::from_pixels(1000),
            Err(ConfigurationError::UnsupportedResolution(1000))
        );
        assert_eq!(RetinaResolution::Downsample32.coordinate_bits(), 5);
    }
}
