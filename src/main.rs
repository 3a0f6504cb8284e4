use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::fs::File;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pushbot_lib::allocator::InstanceKeyAllocator;
use pushbot_lib::bridge::LoggingHandler;
use pushbot_lib::config::TransportKind;
use pushbot_lib::transport::{DuplexChannel, Endianness, TcpChannel, UdpChannel};
use pushbot_lib::{BridgeConfig, Device, ListenerExit, LiveEventBridge};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportArg {
    Text,
    Binary,
    Udp,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Text => TransportKind::Text,
            TransportArg::Binary => TransportKind::Binary,
            TransportArg::Udp => TransportKind::Udp,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EndianArg {
    Little,
    Big,
}

impl From<EndianArg> for Endianness {
    fn from(arg: EndianArg) -> Self {
        match arg {
            EndianArg::Little => Endianness::Little,
            EndianArg::Big => Endianness::Big,
        }
    }
}

/// Bridge a PushBot robot to the neural network command side.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file with the devices and neuron assignments.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Robot host, overrides the config file.
    #[arg(long)]
    host: Option<String>,
    /// Robot port, overrides the config file.
    #[arg(short, long)]
    port: Option<u16>,
    /// Link to the robot, overrides the config file.
    #[arg(short, long, value_enum)]
    transport: Option<TransportArg>,
    /// Byte order of binary frames, overrides the config file.
    #[arg(short, long, value_enum)]
    endian: Option<EndianArg>,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

impl Cli {
    fn bridge_config(&self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => {
                BridgeConfig::load(path).with_context(|| format!("Failed to load config from {:?}", path))?
            }
            None => BridgeConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(transport) = self.transport {
            config.transport = transport.into();
        }
        if let Some(endian) = self.endian {
            config.endianness = endian.into();
        }
        Ok(config)
    }
}

fn setup_logging(log_file_path: Option<PathBuf>, verbosity: &Verbosity<InfoLevel>) -> Result<Option<WorkerGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_thread_ids(false);

    let (file_layer, guard) = if let Some(ref path) = log_file_path {
        let log_file = File::create(path).with_context(|| format!("Failed to create log file at: {:?}", path))?;
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(log_file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // INFO by default, DEBUG with -v (per command bytes), TRACE with -vv
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file_path {
        info!("Logging to file: {:?}", path);
    }

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file.clone(), &cli.verbose)?;
    let config = cli.bridge_config()?;

    if let Err(e) = run(config).await {
        error!("Bridge failed: {:?}", e);
        process::exit(1);
    }

    Ok(())
}

async fn run(config: BridgeConfig) -> Result<()> {
    if config.devices.is_empty() {
        bail!("No devices configured, nothing to bridge");
    }
    let devices = config
        .build_devices(&InstanceKeyAllocator::global())
        .context("Invalid device configuration")?;
    let remote = resolve(&config.robot_addr()).await?;
    info!(%remote, transport = ?config.transport, devices = devices.len(), "Connecting to robot");

    match config.transport {
        TransportKind::Text | TransportKind::Binary => {
            let channel = TcpChannel::connect(remote).await.context("TCP connect failed")?;
            serve(channel, devices, &config).await
        }
        TransportKind::Udp => {
            let local = SocketAddr::new([0, 0, 0, 0].into(), config.local_port);
            let channel = UdpChannel::connect(local, remote).await.context("UDP setup failed")?;
            serve(channel, devices, &config).await
        }
    }
}

async fn resolve(addr: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(addr)
        .await
        .with_context(|| format!("Failed to resolve {addr}"))?
        .next()
        .with_context(|| format!("No address for {addr}"))
}

async fn serve<C: DuplexChannel>(channel: C, devices: Vec<Device>, config: &BridgeConfig) -> Result<()> {
    let mut bridge = LiveEventBridge::new(channel, devices, Arc::new(LoggingHandler), config.bridge_options())?;
    for entry in bridge.device_command_table().entries() {
        info!(
            neuron = entry.neuron_id,
            role = %entry.role,
            key = %format!("{:#010x}", entry.command_key),
            "Control neuron"
        );
    }

    bridge.start().await.context("Failed to start the bridge")?;
    info!("Bridge running, press Ctrl+C to stop");

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
    info!("Stopping");

    match bridge.close().await.context("Failed to stop the bridge")? {
        Some(ListenerExit::Disconnected(e)) => warn!("Robot had disconnected before stop: {}", e),
        Some(ListenerExit::Shutdown) | None => {}
    }
    Ok(())
}
