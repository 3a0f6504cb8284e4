use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use std::fmt;

use crate::key::{decode_family, decode_sub_opcode};

/// When a command is sent relative to the simulation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "i32")]
pub enum SendTime {
    /// On start and on every resume (raw `0`)
    OnStart,
    /// On pause and on stop (raw `-1`)
    OnPause,
    /// At this simulation time offset, in timesteps
    At(u32),
}

impl SendTime {
    pub fn as_raw(self) -> i32 {
        match self {
            SendTime::OnStart => 0,
            SendTime::OnPause => -1,
            SendTime::At(t) => i32::try_from(t).unwrap_or(i32::MAX),
        }
    }
}

impl From<SendTime> for i32 {
    fn from(time: SendTime) -> Self {
        time.as_raw()
    }
}

impl From<i32> for SendTime {
    fn from(raw: i32) -> Self {
        match raw {
            0 => SendTime::OnStart,
            t if t < 0 => SendTime::OnPause,
            t => SendTime::At(t.unsigned_abs()),
        }
    }
}

/// A multicast command: a key and an optional payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Command {
    pub key: u32,
    pub payload: Option<u32>,
    pub send_time: SendTime,
    pub repeat: u32,
    pub delay_between_repeats_ms: u32,
}

impl Command {
    pub fn new(key: u32, payload: Option<u32>, send_time: SendTime) -> Self {
        Self {
            key,
            payload,
            send_time,
            repeat: 0,
            delay_between_repeats_ms: 0,
        }
    }

    pub fn with_repeats(mut self, repeat: u32, delay_between_repeats_ms: u32) -> Self {
        self.repeat = repeat;
        self.delay_between_repeats_ms = delay_between_repeats_ms;
        self
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// The same command carrying `payload` instead, used for neutral stop values.
    pub fn with_payload(mut self, payload: u32) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_send_time(mut self, send_time: SendTime) -> Self {
        self.send_time = send_time;
        self
    }

    /// Key followed by the payload, if any, in the given byte order.
    pub fn to_wire<B: byteorder::ByteOrder>(&self) -> Bytes {
        encode_key_payload::<B>(self.key, self.payload)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "key={:#010x} (I={} D={})",
            self.key,
            decode_family(self.key),
            decode_sub_opcode(self.key)
        )?;
        if let Some(payload) = self.payload {
            write!(f, " payload={:#010x}", payload)?;
        }
        write!(f, " time={}", self.send_time.as_raw())
    }
}

/// Binary link representation: 4 bytes key, then 4 bytes payload when present.
pub fn encode_key_payload<B: byteorder::ByteOrder>(key: u32, payload: Option<u32>) -> Bytes {
    let mut word = [0u8; 4];
    let mut buf = BytesMut::with_capacity(8);
    B::write_u32(&mut word, key);
    buf.put_slice(&word);
    if let Some(payload) = payload {
        B::write_u32(&mut word, payload);
        buf.put_slice(&word);
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, LittleEndian};

    #[test]
    fn test_send_time_raw_values() {
        assert_eq!(SendTime::OnStart.as_raw(), 0);
        assert_eq!(SendTime::OnPause.as_raw(), -1);
        assert_eq!(SendTime::At(250).as_raw(), 250);
        assert_eq!(SendTime::from(-1), SendTime::OnPause);
        assert_eq!(SendTime::from(7), SendTime::At(7));
    }

    #[test]
    fn test_wire_layout() {
        let command = Command::new(0x0000_07f1, Some(1), SendTime::OnStart);
        assert_eq!(hex::encode(command.to_wire::<LittleEndian>()), "f107000001000000");
        assert_eq!(hex::encode(command.to_wire::<BigEndian>()), "000007f100000001");

        let bare = Command::new(0x10, None, SendTime::OnPause);
        assert_eq!(bare.to_wire::<LittleEndian>().len(), 4);
    }
}
