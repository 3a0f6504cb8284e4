use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::Display;
use tracing::debug;

use crate::constants::CONTROL_MODULE_NEURONS;
use crate::error::ConfigurationError;
use crate::protocol::CommandId;

/// A device command a control module neuron can drive.
///
/// Declaration order is the firmware bit order: the command bitmask of a
/// role is `1 << discriminant`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CommandRole {
    Motor0Permanent,
    Motor0Leaky,
    Motor1Permanent,
    Motor1Leaky,
    LaserTotalPeriod,
    SpeakerTotalPeriod,
    LedTotalPeriod,
    LaserActiveTime,
    SpeakerActiveTime,
    LedFrontActiveTime,
    LedBackActiveTime,
    SpeakerToneFrequency,
    SpeakerMelody,
    LedFrequency,
    LaserFrequency,
}

/// Pairs of roles that drive the same actuator and cannot both be assigned.
const EXCLUSIVE_ROLES: [(CommandRole, CommandRole); 3] = [
    (CommandRole::Motor0Permanent, CommandRole::Motor0Leaky),
    (CommandRole::Motor1Permanent, CommandRole::Motor1Leaky),
    (CommandRole::SpeakerToneFrequency, CommandRole::SpeakerMelody),
];

impl CommandRole {
    pub const ALL: [CommandRole; CONTROL_MODULE_NEURONS as usize] = [
        CommandRole::Motor0Permanent,
        CommandRole::Motor0Leaky,
        CommandRole::Motor1Permanent,
        CommandRole::Motor1Leaky,
        CommandRole::LaserTotalPeriod,
        CommandRole::SpeakerTotalPeriod,
        CommandRole::LedTotalPeriod,
        CommandRole::LaserActiveTime,
        CommandRole::SpeakerActiveTime,
        CommandRole::LedFrontActiveTime,
        CommandRole::LedBackActiveTime,
        CommandRole::SpeakerToneFrequency,
        CommandRole::SpeakerMelody,
        CommandRole::LedFrequency,
        CommandRole::LaserFrequency,
    ];

    /// One-hot firmware command bit.
    pub const fn bitmask(self) -> u32 {
        1 << self as u32
    }

    pub const fn command_id(self) -> CommandId {
        match self {
            CommandRole::Motor0Permanent => CommandId::Motor0Permanent,
            CommandRole::Motor0Leaky => CommandId::Motor0Leaky,
            CommandRole::Motor1Permanent => CommandId::Motor1Permanent,
            CommandRole::Motor1Leaky => CommandId::Motor1Leaky,
            CommandRole::LaserTotalPeriod => CommandId::LaserTotalPeriod,
            CommandRole::SpeakerTotalPeriod => CommandId::SpeakerTotalPeriod,
            CommandRole::LedTotalPeriod => CommandId::LedTotalPeriod,
            CommandRole::LaserActiveTime => CommandId::LaserActiveTime,
            CommandRole::SpeakerActiveTime => CommandId::SpeakerActiveTime,
            CommandRole::LedFrontActiveTime => CommandId::LedFrontActiveTime,
            CommandRole::LedBackActiveTime => CommandId::LedBackActiveTime,
            CommandRole::SpeakerToneFrequency => CommandId::SpeakerTone,
            CommandRole::SpeakerMelody => CommandId::SpeakerMelody,
            CommandRole::LedFrequency => CommandId::LedFrequency,
            CommandRole::LaserFrequency => CommandId::LaserFrequency,
        }
    }
}

/// Key of a device command together with the instance key of its protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OwnedKey {
    pub command_key: u32,
    pub owning_instance_key: u32,
}

/// Something that knows the keys of device commands, usually a device list.
pub trait CommandKeySource {
    fn key_for(&self, id: CommandId) -> Option<OwnedKey>;
}

/// One populated slot of the control module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NeuronCommandEntry {
    pub neuron_id: u8,
    pub role: CommandRole,
    pub command_bitmask: u32,
    pub owning_instance_key: u32,
    pub command_key: u32,
}

/// Validated assignment of control module neurons to device commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NeuronCommandTable {
    slots: [Option<NeuronCommandEntry>; CONTROL_MODULE_NEURONS as usize],
}

impl NeuronCommandTable {
    pub fn entry(&self, neuron_id: u8) -> Option<&NeuronCommandEntry> {
        self.slots.get(usize::from(neuron_id))?.as_ref()
    }

    pub fn entries(&self) -> impl Iterator<Item = &NeuronCommandEntry> {
        self.slots.iter().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    pub fn neuron_to_key(&self, neuron_id: u8) -> Option<u32> {
        self.entry(neuron_id).map(|entry| entry.command_key)
    }

    pub fn key_to_neuron(&self, key: u32) -> Option<u8> {
        self.entries()
            .find(|entry| entry.command_key == key)
            .map(|entry| entry.neuron_id)
    }

    /// Firmware layout: per neuron `[bitmask, owning instance key, command key]`
    /// as little-endian words, zero for unused neurons.
    pub fn to_words(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.slots.len() * 12);
        for slot in &self.slots {
            let (bitmask, instance_key, key) = slot.map_or((0, 0, 0), |entry| {
                (entry.command_bitmask, entry.owning_instance_key, entry.command_key)
            });
            buf.put_u32_le(bitmask);
            buf.put_u32_le(instance_key);
            buf.put_u32_le(key);
        }
        buf.freeze()
    }
}

pub struct NeuronCommandMapper;

impl NeuronCommandMapper {
    pub fn build(
        assignments: &BTreeMap<CommandRole, u8>,
        source: &(impl CommandKeySource + ?Sized),
    ) -> Result<NeuronCommandTable, ConfigurationError> {
        for (&role, &neuron) in assignments {
            if neuron >= CONTROL_MODULE_NEURONS {
                return Err(ConfigurationError::NeuronOutOfRange {
                    role,
                    neuron,
                    max: CONTROL_MODULE_NEURONS,
                });
            }
        }

        for (first, second) in EXCLUSIVE_ROLES {
            if let (Some(&first_neuron), Some(&second_neuron)) = (assignments.get(&first), assignments.get(&second)) {
                return Err(ConfigurationError::ConflictingCommands {
                    first,
                    first_neuron,
                    second,
                    second_neuron,
                });
            }
        }

        let mut table = NeuronCommandTable::default();
        for (&role, &neuron) in assignments {
            let slot = &mut table.slots[usize::from(neuron)];
            if let Some(existing) = slot.as_ref() {
                return Err(ConfigurationError::ConflictingCommands {
                    first: existing.role,
                    first_neuron: existing.neuron_id,
                    second: role,
                    second_neuron: neuron,
                });
            }

            let owned = source
                .key_for(role.command_id())
                .ok_or(ConfigurationError::MissingDevice(role))?;
            debug!(%role, neuron, key = owned.command_key, "Neuron command assigned");
            *slot = Some(NeuronCommandEntry {
                neuron_id: neuron,
                role,
                command_bitmask: role.bitmask(),
                owning_instance_key: owned.owning_instance_key,
                command_key: owned.command_key,
            });
        }
        Ok(table)
    }
}
