use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pushbot_lib::BridgeConfig;
use pushbot_lib::allocator::InstanceKeyAllocator;
use pushbot_lib::command::Command;
use pushbot_lib::control::{NeuronCommandEntry, NeuronCommandMapper};
use pushbot_lib::device::Device;
use pushbot_lib::key::{decode_family, decode_sub_opcode};
use pushbot_lib::protocol::CommandId;

/// Print the commands each configured device sends, and the control neuron table, as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON bridge config with the devices and neuron assignments.
    config: PathBuf,
    /// Also print the neuron table as the hex words loaded onto the control module.
    #[arg(short, long)]
    words: bool,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Serialize)]
struct CommandRow {
    command: Option<CommandId>,
    key: String,
    family: u8,
    sub_opcode: u8,
    payload: Option<u32>,
    send_time: i32,
}

impl CommandRow {
    fn new(device: &Device, command: &Command) -> Self {
        Self {
            command: device.command_id(command.key),
            key: format!("{:#010x}", command.key),
            family: decode_family(command.key),
            sub_opcode: decode_sub_opcode(command.key),
            payload: command.payload,
            send_time: command.send_time.as_raw(),
        }
    }
}

#[derive(Serialize)]
struct DeviceRow {
    name: &'static str,
    instance_key: String,
    uart_id: u8,
    start_resume: Vec<CommandRow>,
    pause_stop: Vec<CommandRow>,
    timed: Vec<CommandRow>,
}

impl DeviceRow {
    fn new(device: &Device) -> Self {
        let rows = |commands: &[Command]| -> Vec<CommandRow> {
            commands.iter().map(|c| CommandRow::new(device, c)).collect()
        };
        Self {
            name: device.name(),
            instance_key: format!("{:#010x}", device.protocol().instance_key()),
            uart_id: device.uart_id(),
            start_resume: rows(device.start_resume_commands()),
            pause_stop: rows(device.pause_stop_commands()),
            timed: rows(device.timed_commands()),
        }
    }
}

#[derive(Serialize)]
struct Report<'a> {
    devices: Vec<DeviceRow>,
    neurons: Vec<&'a NeuronCommandEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    words: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(cli.verbose.tracing_level_filter().into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    let config =
        BridgeConfig::load(&cli.config).with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    let devices = config
        .build_devices(&InstanceKeyAllocator::new())
        .context("Invalid device configuration")?;
    let table = NeuronCommandMapper::build(&config.neurons, devices.as_slice()).context("Invalid neuron assignments")?;
    info!(devices = devices.len(), neurons = table.entries().count(), "Built command table");

    let report = Report {
        devices: devices.iter().map(DeviceRow::new).collect(),
        neurons: table.entries().collect(),
        words: cli.words.then(|| hex::encode(table.to_words())),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
