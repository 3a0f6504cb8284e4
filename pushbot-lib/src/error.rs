use std::io;
use thiserror::Error;

use crate::control::CommandRole;
use crate::protocol::Mode;

/// Construction-time errors. Any of these aborts building a device or bridge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Conflicting commands: {first} (neuron {first_neuron}) and {second} (neuron {second_neuron})")]
    ConflictingCommands {
        first: CommandRole,
        first_neuron: u8,
        second: CommandRole,
        second_neuron: u8,
    },

    #[error("Neuron id {neuron} for {role} is out of range (control module has {max} neurons)")]
    NeuronOutOfRange { role: CommandRole, neuron: u8, max: u8 },

    #[error("No configured device provides the command for {0}")]
    MissingDevice(CommandRole),

    #[error("Unsupported retina resolution: {0} pixels")]
    UnsupportedResolution(u32),

    #[error("Unsupported timestamp configuration: {0}")]
    UnsupportedTimestamps(String),

    #[error("Retina events carried in payloads cannot have timestamps")]
    TimestampsWithPayloadEvents,

    #[error("Command {command} is only valid in push bot mode, protocol is in mode {mode}")]
    InvalidForMode { command: &'static str, mode: Mode },

    #[error("Unsupported mode payload: {0}")]
    UnsupportedMode(u32),

    #[error("Speaker needs exactly one of a start frequency or a melody")]
    SpeakerStartState,

    #[error("Key {key:#010x} is claimed by both {first} and {second}")]
    KeyCollision {
        key: u32,
        first: &'static str,
        second: &'static str,
    },
}

/// Runtime decode/translation errors. Logged and the offending unit dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed frame {}: {reason}", hex::encode(.bytes))]
    MalformedFrame { bytes: Vec<u8>, reason: String },

    #[error("Unknown command key: {0:#010x}")]
    UnknownCommandKey(u32),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Timeout during transport operation: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Channel is closed")]
    Closed,
}

/// The primary error type for the `pushbot-lib` library.
#[derive(Error, Debug)]
pub enum PushBotError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid config file: {0}")]
    ConfigFile(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
