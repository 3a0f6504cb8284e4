//! Tests for the control module neuron to command table

mod common;

use common::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn devices() -> Vec<Device> {
    let protocol = Arc::new(MunichProtocol::with_instance_key(Mode::PushBot, 1 << 11));
    actuators(&protocol)
}

#[test]
fn test_full_assignment() {
    let devices = devices();
    let assignments: BTreeMap<CommandRole, u8> = CommandRole::ALL
        .iter()
        .enumerate()
        .filter(|(_, role)| !matches!(role, CommandRole::Motor0Leaky | CommandRole::Motor1Leaky | CommandRole::SpeakerMelody))
        .map(|(neuron, &role)| (role, neuron as u8))
        .collect();

    let table = NeuronCommandMapper::build(&assignments, devices.as_slice()).unwrap();
    assert_eq!(table.entries().count(), 12);

    for entry in table.entries() {
        assert_eq!(entry.command_bitmask, 1 << entry.neuron_id);
        assert_eq!(entry.owning_instance_key, 1 << 11);
        assert_eq!(table.key_to_neuron(entry.command_key), Some(entry.neuron_id));
    }

    // speaker period and back LED resolve to their own devices
    let speaker = &devices[5];
    let back_led = &devices[4];
    assert_eq!(
        table.neuron_to_key(5),
        speaker.key(CommandId::SpeakerTotalPeriod),
        "speaker total period"
    );
    assert_eq!(
        table.neuron_to_key(10),
        back_led.key(CommandId::LedBackActiveTime),
        "back LED active time"
    );
}

#[test]
fn test_exclusive_roles_conflict() {
    let devices = devices();
    let assignments = BTreeMap::from([(CommandRole::Motor0Permanent, 0), (CommandRole::Motor0Leaky, 0)]);
    assert_eq!(
        NeuronCommandMapper::build(&assignments, devices.as_slice()),
        Err(ConfigurationError::ConflictingCommands {
            first: CommandRole::Motor0Permanent,
            first_neuron: 0,
            second: CommandRole::Motor0Leaky,
            second_neuron: 0,
        })
    );

    // exclusive even on separate neurons
    let assignments = BTreeMap::from([(CommandRole::SpeakerToneFrequency, 3), (CommandRole::SpeakerMelody, 4)]);
    let err = NeuronCommandMapper::build(&assignments, devices.as_slice()).unwrap_err();
    assert!(
        matches!(err, ConfigurationError::ConflictingCommands { first_neuron: 3, second_neuron: 4, .. }),
        "{err}"
    );
}

#[test]
fn test_two_roles_on_one_neuron_conflict() {
    let devices = devices();
    let assignments = BTreeMap::from([(CommandRole::LaserTotalPeriod, 7), (CommandRole::LedFrequency, 7)]);
    assert_eq!(
        NeuronCommandMapper::build(&assignments, devices.as_slice()),
        Err(ConfigurationError::ConflictingCommands {
            first: CommandRole::LaserTotalPeriod,
            first_neuron: 7,
            second: CommandRole::LedFrequency,
            second_neuron: 7,
        })
    );
}

#[test]
fn test_role_without_device() {
    let allocator = InstanceKeyAllocator::new();
    let devices = vec![Device::new(DeviceKind::Laser(LaserConfig::default()), push_bot_protocol(&allocator), 0).unwrap()];
    let assignments = BTreeMap::from([(CommandRole::LaserFrequency, 14), (CommandRole::Motor1Permanent, 2)]);
    assert_eq!(
        NeuronCommandMapper::build(&assignments, devices.as_slice()),
        Err(ConfigurationError::MissingDevice(CommandRole::Motor1Permanent))
    );
}

#[test]
fn test_words_layout() {
    let devices = devices();
    let assignments = BTreeMap::from([(CommandRole::LedFrequency, 1)]);
    let table = NeuronCommandMapper::build(&assignments, devices.as_slice()).unwrap();
    let words = table.to_words();

    assert_eq!(words.len(), 15 * 3 * 4);
    let key = devices[3].key(CommandId::LedFrequency).unwrap();
    let expected = format!(
        "{}{}{}",
        hex::encode((1u32 << 13).to_le_bytes()),
        hex::encode((1u32 << 11).to_le_bytes()),
        hex::encode(key.to_le_bytes())
    );
    assert_eq!(hex::encode(&words[12..24]), expected);
    assert!(words[..12].iter().all(|&b| b == 0), "neuron 0 is unused");
}
