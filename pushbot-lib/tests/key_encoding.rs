//! Tests for command key packing and instance separation

mod common;

use common::*;
use pushbot_lib::key::{UartOffset, decode_family, decode_instance, decode_sub_opcode, encode};
use pushbot_lib::protocol::COMMAND_TABLE;
use std::collections::HashSet;

#[test]
fn test_configure_master_key() {
    assert_eq!(encode(127, 0, 0, 0, UartOffset::Wide), 127 << 4);
    assert_eq!(encode(127, 0, 0, 5, UartOffset::Wide), (127 << 4) | (5 << 11));

    let protocol = MunichProtocol::with_instance_key(Mode::PushBot, 5 << 11);
    let command = protocol.get_configure_master_key_command(0xabcd, SendTime::OnStart);
    assert_eq!(command.key, (127 << 4) | (5 << 11));
    assert_eq!(command.payload, Some(0xabcd));
}

#[test]
fn test_protocol_instances_never_share_keys() {
    let allocator = InstanceKeyAllocator::new();
    let protocols: Vec<_> = (0..4).map(|_| MunichProtocol::new(Mode::PushBot, &allocator)).collect();

    let key_sets: Vec<HashSet<u32>> = protocols
        .iter()
        .map(|protocol| {
            COMMAND_TABLE
                .iter()
                .flat_map(|spec| (0..2).map(move |uart_id| protocol.key(spec.id, uart_id)))
                .collect()
        })
        .collect();
    for (i, first) in key_sets.iter().enumerate() {
        for second in &key_sets[i + 1..] {
            assert!(first.is_disjoint(second), "instances share keys: {:x?}", first.intersection(second));
        }
    }

    // same command and uart on two instances always differs
    for spec in &COMMAND_TABLE {
        let keys: HashSet<u32> = protocols.iter().map(|p| p.key(spec.id, 0)).collect();
        assert_eq!(keys.len(), protocols.len(), "{} aliases across instances", spec.id);
    }
}

#[test]
fn test_uart_offsets_per_command() {
    let protocol = MunichProtocol::with_instance_key(Mode::PushBot, 0);
    let narrow = protocol.push_bot_speaker_set_tone(440, 1, SendTime::OnStart).unwrap();
    assert_eq!(narrow.key, (36 << 4) | (1 << 1));

    let wide = protocol.push_bot_motor_0_permanent(10, 1, SendTime::OnStart).unwrap();
    assert_eq!(wide.key, (32 << 4) | (1 << 29));

    // sensor commands carry no uart id
    let sensor = protocol.poll_sensors_once(8, SendTime::OnStart);
    assert_eq!(sensor.key, (1 << 4) | 1);
}

#[test]
fn test_decode_fields() {
    let key = hex_to_bytes("00001a41");
    let key = u32::from_be_bytes([key[0], key[1], key[2], key[3]]);
    assert_eq!(decode_sub_opcode(key), 1);
    assert_eq!(decode_family(key), 0x24);
    assert_eq!(decode_instance(key), 3);
}
