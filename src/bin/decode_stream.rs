use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pushbot_lib::classifier::{StreamFrameClassifier, StreamItem};
use pushbot_lib::retina::{RetinaEventFormat, RetinaPolarity, RetinaResolution, TimestampSize};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolarityArg {
    Up,
    Down,
    Merged,
}

impl From<PolarityArg> for RetinaPolarity {
    fn from(arg: PolarityArg) -> Self {
        match arg {
            PolarityArg::Up => RetinaPolarity::Up,
            PolarityArg::Down => RetinaPolarity::Down,
            PolarityArg::Merged => RetinaPolarity::Merged,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TimestampArg {
    None,
    Two,
    Three,
    Four,
}

impl From<TimestampArg> for Option<TimestampSize> {
    fn from(arg: TimestampArg) -> Self {
        match arg {
            TimestampArg::None => None,
            TimestampArg::Two => Some(TimestampSize::TwoBytes),
            TimestampArg::Three => Some(TimestampSize::ThreeBytes),
            TimestampArg::Four => Some(TimestampSize::FourBytes),
        }
    }
}

/// Split a robot byte stream into retina events and text lines.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Hex encoded bytes, e.g. "4f4b0a8141".
    #[arg(conflicts_with = "file", required_unless_present = "file")]
    hex: Option<String>,
    /// Raw capture of the robot byte stream.
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Feed the classifier this many bytes at a time, 0 for all at once.
    #[arg(short, long, default_value_t = 0)]
    chunk_size: usize,
    /// Retina side length: 128, 64, 32 or 16.
    #[arg(short, long, default_value_t = 128)]
    resolution: u32,
    #[arg(short, long, value_enum, default_value = "merged")]
    polarity: PolarityArg,
    #[arg(short, long, value_enum, default_value = "none")]
    timestamps: TimestampArg,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

fn read_input(cli: &Cli) -> Result<Vec<u8>> {
    match (&cli.hex, &cli.file) {
        (Some(hex_data), _) => {
            let cleaned: String = hex_data.chars().filter(|c| !c.is_whitespace()).collect();
            hex::decode(cleaned).context("Invalid hex input")
        }
        (None, Some(path)) => std::fs::read(path).with_context(|| format!("Failed to read {:?}", path)),
        (None, None) => bail!("Give hex bytes or --file"),
    }
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

    let format = RetinaEventFormat::new(
        RetinaResolution::from_side(cli.resolution)?,
        cli.polarity.into(),
        cli.timestamps.into(),
    )?;
    let data = read_input(&cli)?;
    let chunk_size = if cli.chunk_size == 0 { data.len().max(1) } else { cli.chunk_size };
    info!(bytes = data.len(), chunk_size, frame_size = format.frame_size(), "Decoding");

    let mut classifier = StreamFrameClassifier::new(format);
    let (mut events, mut lines, mut malformed) = (0usize, 0usize, 0usize);
    for chunk in data.chunks(chunk_size) {
        for item in classifier.feed(chunk) {
            match item {
                StreamItem::Event(event) => {
                    events += 1;
                    println!("{}", serde_json::to_string(&event)?);
                }
                StreamItem::Line(line) => {
                    lines += 1;
                    println!("{:?}", line);
                }
                StreamItem::Malformed(e) => {
                    malformed += 1;
                    warn!("{}", e);
                }
            }
        }
    }

    if !classifier.pending_binary_tail().is_empty() {
        warn!(tail = %hex::encode(classifier.pending_binary_tail()), "Incomplete frame at end of input");
    }
    if !classifier.pending_ascii_tail().is_empty() {
        warn!(tail = classifier.pending_ascii_tail(), "Unterminated line at end of input");
    }
    info!(events, lines, malformed, "Done");
    Ok(())
}
