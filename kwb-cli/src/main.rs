//! KWB Heater Monitor CLI
//!
//! Command-line front end for the kwb-decoder library. It reads a KWB
//! Easyfire controller over TCP, a serial line or a capture file and prints
//! either the raw messages with their decoded signals or the derived data
//! records (runtime, energy, pellet consumption).

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use kwb_decoder::{
    load_signal_map, ByteSource, DecoderError, MessageStream, ReplayFormat, ReplaySource, SerialSource,
    SignalMap, TcpSource,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod config;
mod output;

use config::{AppConfig, InputKind};
use output::Printer;

/// Timeout for `--once` reads when none is given
const DEFAULT_ONCE_TIMEOUT_SECS: f64 = 3.0;

/// KWB Heater Monitor - Decode the KWB Easyfire serial protocol
#[derive(Parser, Debug)]
#[command(name = "kwb-cli")]
#[command(about = "Read and decode KWB pellet heater controllers", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (kwb.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Read from a serial-to-network bridge
    #[arg(long, value_name = "HOST:PORT", conflicts_with_all = ["serial", "file"])]
    tcp: Option<String>,

    /// Read from a serial device
    #[arg(long, value_name = "DEVICE", conflicts_with = "file")]
    serial: Option<String>,

    /// Serial data rate
    #[arg(long, value_name = "BAUD")]
    baud: Option<u32>,

    /// Replay a capture file
    #[arg(long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Capture file layout
    #[arg(long, value_enum)]
    format: Option<CaptureFormat>,

    /// Signal table (CSV)
    #[arg(short, long, value_name = "FILE")]
    signals: Option<PathBuf>,

    /// Controller source number in the signal table
    #[arg(long, value_name = "SOURCE")]
    source: Option<u32>,

    /// Message ids to read, comma separated
    #[arg(long, value_name = "ID,...", value_delimiter = ',')]
    ids: Vec<u8>,

    /// Read each requested id once and exit
    #[arg(long)]
    once: bool,

    /// Deadline for --once, in seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<f64>,

    /// Print derived data records instead of raw messages
    #[arg(long)]
    data: bool,

    /// Reopen the byte source after a timeout or I/O error
    #[arg(long)]
    reconnect: bool,

    /// Also emit message ids that were not requested
    #[arg(long)]
    permissive: bool,

    /// Print one JSON object per line
    #[arg(long)]
    json: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CaptureFormat {
    /// Raw bytes as received
    Binary,
    /// One decimal byte value per line
    Decimal,
}

impl From<CaptureFormat> for ReplayFormat {
    fn from(format: CaptureFormat) -> Self {
        match format {
            CaptureFormat::Binary => ReplayFormat::Binary,
            CaptureFormat::Decimal => ReplayFormat::Decimal,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("KWB Heater Monitor v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", kwb_decoder::VERSION);

    let config = resolve_config(&args)?;
    config.validate()?;

    let signal_map = load_signal_map(&config.signals.path, &config.signals.filter)
        .with_context(|| format!("Failed to load signal table {:?}", config.signals.path))?;

    let source = build_source(&config)?;
    let mut stream = MessageStream::with_state(
        source,
        Arc::new(signal_map),
        config.stream_config(),
        config.state.to_state(),
    )?;
    stream.open().context("Failed to open byte source")?;

    let printer = Printer::new(args.json);
    if args.once {
        read_once(&mut stream, &args, &printer)?;
    } else {
        read_continuous(&mut stream, &args, &printer)?;
    }

    let state = stream.into_state();
    log::info!(
        "Final counters: run_time={:.0}s energy={:.3}kWh pellets={:.3}kg",
        state.run_time_sec,
        state.energy_kwh,
        state.pellet_consumption_kg
    );
    Ok(())
}

/// Load the config file (if any) and apply command-line overrides
fn resolve_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    if let Some(address) = &args.tcp {
        config.input.kind = InputKind::Tcp;
        config.input.address = address.clone();
    }
    if let Some(device) = &args.serial {
        config.input.kind = InputKind::Serial;
        config.input.device = device.clone();
    }
    if let Some(baud) = args.baud {
        config.input.baud_rate = baud;
    }
    if let Some(path) = &args.file {
        config.input.kind = InputKind::File;
        config.input.path = Some(path.clone());
    }
    if let Some(format) = args.format {
        config.input.format = format.into();
    }
    if args.reconnect {
        config.input.reconnect = true;
    }
    if args.permissive {
        config.input.filter_mode = kwb_decoder::FilterMode::Permissive;
    }

    if let Some(path) = &args.signals {
        config.signals.path = path.clone();
    }
    if let Some(source) = args.source {
        config.signals.filter.source = source;
    }
    if !args.ids.is_empty() {
        config.signals.filter.message_ids = args.ids.clone();
    }

    log::debug!("Effective configuration: {:?}", config);
    Ok(config)
}

fn build_source(config: &AppConfig) -> Result<Box<dyn ByteSource>> {
    let input = &config.input;
    let read_timeout = Duration::from_millis(input.read_timeout_ms);

    let source: Box<dyn ByteSource> = match input.kind {
        InputKind::Tcp => {
            log::info!("Reading from TCP bridge {}", input.address);
            Box::new(TcpSource::new(input.address.clone()).with_read_timeout(read_timeout))
        }
        InputKind::Serial => {
            log::info!("Reading from serial device {} at {} baud", input.device, input.baud_rate);
            Box::new(SerialSource::new(input.device.clone(), input.baud_rate).with_timeout(read_timeout))
        }
        InputKind::File => {
            let Some(path) = &input.path else {
                bail!("No capture file given");
            };
            log::info!("Replaying capture file {:?}", path);
            Box::new(ReplaySource::new(path.clone(), input.format))
        }
    };
    Ok(source)
}

/// `--once`: each requested id once, then exit
fn read_once(
    stream: &mut MessageStream<Box<dyn ByteSource>>,
    args: &Args,
    printer: &Printer,
) -> Result<()> {
    let ids = once_ids(&args.ids, stream.signal_map());
    if ids.is_empty() {
        bail!("--once needs at least one message id (--ids)");
    }
    let seconds = args.timeout.unwrap_or(DEFAULT_ONCE_TIMEOUT_SECS);
    if !(seconds.is_finite() && seconds > 0.0) {
        bail!("--timeout must be a positive number of seconds, got {}", seconds);
    }
    let timeout = Duration::from_secs_f64(seconds);

    if args.data {
        match stream.read_data_once(&ids, Some(timeout))? {
            Some(record) => printer.record(&record)?,
            None => log::warn!("No message from {:?} within {:.1}s", ids, seconds),
        }
        return Ok(());
    }

    let mut messages = stream.read_messages(&ids, Some(timeout));
    let mut received = Vec::new();
    for message in messages.by_ref() {
        received.push(message?);
    }
    let outcome = messages.outcome();
    let missing = messages.remaining().to_vec();
    drop(messages);

    for message in &received {
        printer.message(message, &stream.decode(message))?;
    }
    if !missing.is_empty() {
        log::warn!("Read ended ({:?}) without messages {:?}", outcome, missing);
    }
    Ok(())
}

/// Ids for `--once`: the requested ones, else every id the signal table describes
fn once_ids(requested: &[u8], signal_map: &SignalMap) -> Vec<u8> {
    if requested.is_empty() {
        signal_map.message_ids()
    } else {
        requested.to_vec()
    }
}

/// Default mode: print everything until the source ends
fn read_continuous(
    stream: &mut MessageStream<Box<dyn ByteSource>>,
    args: &Args,
    printer: &Printer,
) -> Result<()> {
    if args.data {
        for record in stream.read_data(&args.ids, None) {
            printer.record(&record?)?;
        }
        return Ok(());
    }

    loop {
        let message = match stream.read_message() {
            Ok(message) => message,
            Err(DecoderError::EndOfStream) => break,
            Err(e) => return Err(e.into()),
        };
        if !args.ids.is_empty() && !args.ids.contains(&message.message_id()) {
            continue;
        }
        printer.message(&message, &stream.decode(&message))?;
    }
    log::info!("Byte source reached end of stream");
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "kwb-cli",
            "--file",
            "capture.txt",
            "--format",
            "decimal",
            "--ids",
            "32,33",
            "--reconnect",
            "--permissive",
        ]);
        let config = resolve_config(&args).unwrap();

        assert_eq!(config.input.kind, InputKind::File);
        assert_eq!(config.input.path, Some(PathBuf::from("capture.txt")));
        assert_eq!(config.input.format, ReplayFormat::Decimal);
        assert_eq!(config.signals.filter.message_ids, vec![32, 33]);
        assert!(config.input.reconnect);
        assert_eq!(config.input.filter_mode, kwb_decoder::FilterMode::Permissive);
    }

    #[test]
    fn test_conflicting_inputs_rejected() {
        let result = Args::try_parse_from(["kwb-cli", "--tcp", "10.0.0.5:23", "--file", "x.bin"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults_without_flags() {
        let args = Args::parse_from(["kwb-cli"]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.input.kind, InputKind::Tcp);
        assert!(!config.input.reconnect);
        assert!(args.ids.is_empty());
    }

    #[test]
    fn test_once_ids_follow_signal_table() {
        let table = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("signals.csv");
        let map = load_signal_map(&table, &kwb_decoder::SignalMapFilter::default()).unwrap();

        assert_eq!(once_ids(&[], &map), vec![32, 33, 64]);
        assert_eq!(once_ids(&[33], &map), vec![33]);
    }
}
