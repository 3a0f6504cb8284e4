use modular_bitfield::prelude::*;
use serde::{Deserialize, Serialize};

use crate::constants::{INSTANCE_ID_BITS, OFFSET_FOR_UART_ID, OFFSET_TO_END, PUSH_BOT_UART_OFFSET_SPEAKER_LED_LASER};

const FAMILY_MASK: u8 = 0x7f;
const SUB_OPCODE_MASK: u8 = 0x07;
const INSTANCE_MASK: u32 = (1 << INSTANCE_ID_BITS) - 1;

/// Base layout of a command key, least significant field first.
///
/// The uart/channel id is not part of this layout: depending on the command it
/// lives at bit 29 or at bit 1 and overlaps other fields, so it is OR'd in
/// afterwards by [`encode`].
#[bitfield(bytes = 4)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyFields {
    pub sub_opcode: B3,
    pub flag: bool,
    pub family: B7,
    pub instance: B21,
}

impl KeyFields {
    pub fn from_key(key: u32) -> Self {
        Self::from_bytes(key.to_le_bytes())
    }

    pub fn to_key(self) -> u32 {
        u32::from_le_bytes(self.into_bytes())
    }
}

/// Where a command places its uart id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UartOffset {
    /// `PUSH_BOT_UART_OFFSET_SPEAKER_LED_LASER`, bit 1
    Narrow,
    /// `OFFSET_FOR_UART_ID`, bit 29
    Wide,
}

impl UartOffset {
    pub const fn offset(self) -> u32 {
        match self {
            UartOffset::Narrow => PUSH_BOT_UART_OFFSET_SPEAKER_LED_LASER,
            UartOffset::Wide => OFFSET_FOR_UART_ID,
        }
    }
}

/// Pack a command into a 32-bit key.
///
/// Field values wider than their slot are a caller bug: they trip a debug
/// assertion and are masked in release builds.
pub fn encode(family: u8, sub_opcode: u8, channel_id: u8, instance_id: u32, convention: UartOffset) -> u32 {
    debug_assert!(family <= FAMILY_MASK, "family {family} does not fit in 7 bits");
    debug_assert!(sub_opcode <= SUB_OPCODE_MASK, "sub-opcode {sub_opcode} does not fit in 3 bits");
    debug_assert!(instance_id <= INSTANCE_MASK, "instance id {instance_id} does not fit in 21 bits");

    let fields = KeyFields::new()
        .with_sub_opcode(sub_opcode & SUB_OPCODE_MASK)
        .with_flag(false)
        .with_family(family & FAMILY_MASK)
        .with_instance(instance_id & INSTANCE_MASK);

    fields.to_key() | (u32::from(channel_id) << convention.offset())
}

/// Turn an instance id into the key bits it occupies.
pub const fn instance_key(instance_id: u32) -> u32 {
    instance_id << OFFSET_TO_END
}

pub fn decode_family(key: u32) -> u8 {
    KeyFields::from_key(key).family()
}

pub fn decode_sub_opcode(key: u32) -> u8 {
    KeyFields::from_key(key).sub_opcode()
}

pub fn decode_flag(key: u32) -> bool {
    KeyFields::from_key(key).flag()
}

/// Instance id bits of a key. For wide-offset commands with a non-zero uart id
/// the top bits of this value are the uart id.
pub fn decode_instance(key: u32) -> u32 {
    KeyFields::from_key(key).instance()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_shift_arithmetic() {
        let key = encode(37, 1, 0, 3, UartOffset::Wide);
        assert_eq!(key, (3 << 11) | (37 << 4) | 1);
        assert_eq!(decode_family(key), 37);
        assert_eq!(decode_sub_opcode(key), 1);
        assert_eq!(decode_instance(key), 3);
        assert!(!decode_flag(key));
    }

    #[test]
    fn test_uart_conventions() {
        let wide = encode(5, 0, 1, 0, UartOffset::Wide);
        let narrow = encode(37, 0, 1, 0, UartOffset::Narrow);
        assert_eq!(wide, (5 << 4) | (1 << 29));
        assert_eq!(narrow, (37 << 4) | (1 << 1));
    }

    #[test]
    fn test_flag_bit_position() {
        let fields = KeyFields::new().with_flag(true);
        assert_eq!(fields.to_key(), 1 << 3);
    }
}
