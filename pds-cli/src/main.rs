mod serial;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use pds_lib::reply::{self, ReplyKind};
use pds_lib::{
    AssemblerEvent, Command, DeviceConfig, Pds100g, SpectrumAssembler, SpectrumFileWriter, SpectrumRecord, Transport,
};
use serial::SerialTransport;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Download spectra from a PDS-100G radiation spectrometer.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Action,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long, global = true)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// List serial ports
    Ports,
    /// Read the device serial number
    Serial {
        #[command(flatten)]
        link: Link,
    },
    /// Download spectra, newest first, and save each one to a text file
    Fetch {
        #[command(flatten)]
        link: Link,
        /// Number of spectra to download
        #[arg(short, long, default_value_t = 1)]
        count: u32,
        #[command(flatten)]
        output: Output,
    },
    /// Decode a raw reply captured to a file
    Decode {
        /// File holding the raw reply bytes
        file: PathBuf,
        /// Feed the reply in chunks of this many bytes
        #[arg(long, default_value_t = 64)]
        chunk: usize,
        #[command(flatten)]
        output: Output,
    },
}

#[derive(clap::Args, Debug)]
struct Link {
    /// Serial port of the device, e.g. /dev/rfcomm0
    #[arg(short, long)]
    port: String,
    #[arg(short, long, default_value_t = 115_200)]
    baud: u32,
    /// Seconds to wait for each piece of a reply
    #[arg(long, default_value_t = 2)]
    timeout: u64,
}

#[derive(clap::Args, Debug)]
struct Output {
    /// Directory for spectrum files
    #[arg(short, long, default_value = "pds")]
    out_dir: PathBuf,
    /// Print each spectrum header as JSON
    #[arg(long)]
    json: bool,
    /// Do not write spectrum files
    #[arg(long)]
    no_save: bool,
}

/// Console output on stderr, plus a plain-text copy in `log_file` when given.
///
/// The returned guard flushes the file writer when dropped, so it must live
/// until `main` returns.
fn init_tracing(log_file: Option<&Path>, verbosity: &Verbosity<InfoLevel>) -> Result<Option<WorkerGuard>> {
    let level = verbosity.tracing_level_filter();
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    let Some(path) = log_file else {
        tracing_subscriber::registry().with(filter).with(stderr).init();
        return Ok(None);
    };

    let file = File::create(path).with_context(|| format!("Cannot create log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    let copy = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false);
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(copy)
        .init();
    info!(path = %path.display(), "Writing log file");
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref(), &cli.verbose)?;

    tokio::select! {
        res = run(cli.command) => {
            if let Err(e) = res {
                error!("Application failed: {:?}", e);
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down.");
        }
    }
    Ok(())
}

async fn run(action: Action) -> Result<()> {
    match action {
        Action::Ports => list_ports(),
        Action::Serial { link } => {
            let mut pds = connect(&link)?;
            let serial = pds.request_serial_number().await?;
            println!("PDS-100G S/N: {}", serial);
            Ok(())
        }
        Action::Fetch { link, count, output } => {
            let mut pds = connect(&link)?;
            let result = fetch(&mut pds, count, &output).await;
            pds.disconnect();
            result
        }
        Action::Decode { file, chunk, output } => decode(&file, chunk, &output),
    }
}

/// Download up to `count` spectra, stopping at the oldest one in device memory
async fn fetch<T: Transport>(pds: &mut Pds100g<T>, count: u32, output: &Output) -> Result<()> {
    for _ in 0..count {
        let record = pds
            .fetch_spectrum_with(|event| println!("{}", event))
            .await
            .context("Failed to fetch spectrum")?;
        store(&record, output)?;
        if record.header.spectrum_index <= 1 {
            info!("Reached the oldest spectrum in device memory");
            break;
        }
    }
    Ok(())
}

fn list_ports() -> Result<()> {
    let ports = serialport::available_ports().context("Could not enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        println!("{}  {:?}", port.port_name, port.port_type);
    }
    Ok(())
}

fn connect(link: &Link) -> Result<Pds100g<SerialTransport>> {
    let transport = SerialTransport::open(&link.port, link.baud)
        .with_context(|| format!("Failed to open serial port {}", link.port))?;
    let config = DeviceConfig::default().with_read_timeout(Duration::from_secs(link.timeout));
    Ok(Pds100g::with_config(transport, config))
}

fn decode(file: &Path, chunk: usize, output: &Output) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("Failed to read {:?}", file))?;
    let command = match reply::classify(&data)? {
        ReplyKind::SerialNumber => Command::GetSerialNumber,
        ReplyKind::Spectrum => Command::GetLastSpectrum,
    };

    let mut assembler = SpectrumAssembler::new();
    assembler.begin(command);
    for piece in data.chunks(chunk.max(1)) {
        for event in assembler.receive(piece) {
            println!("{}", event);
            match event {
                AssemblerEvent::Completed(record) => store(&record, output)?,
                AssemblerEvent::Failed(err) => bail!(err),
                _ => {}
            }
        }
    }

    if !assembler.is_idle() {
        warn!(buffered = assembler.buffered(), "Capture ends before the reply is complete");
    }
    Ok(())
}

fn store(record: &SpectrumRecord, output: &Output) -> Result<()> {
    if output.json {
        println!("{}", serde_json::to_string_pretty(&record.header)?);
    }
    if let Some(cps) = record.counts_per_second() {
        println!("{} (~{:.3} cps)", record, cps);
    } else {
        println!("{}", record);
    }
    if output.no_save {
        return Ok(());
    }

    match SpectrumFileWriter::new(&output.out_dir).write(record) {
        Ok(path) => println!("Spectrum {} saved to {}", record.header.spectrum_index, path.display()),
        // A failed save does not stop the download
        Err(e) => error!("Save to file error(s): {}", e),
    }
    Ok(())
}
