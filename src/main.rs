//! # Thermalink CLI
//!
//! Command-line interface for rendering and dry-running print jobs.
//!
//! ## Usage
//!
//! ```bash
//! # Hex dump of the bytes a payload renders to
//! thermalink render payload.json
//!
//! # Same payload as a TSPL label, written to a file
//! thermalink render --printer label payload.json --output label.bin
//!
//! # Run a batch of jobs against a simulated printer, printing events as JSON lines
//! thermalink simulate jobs.json --fail-writes 2
//!
//! # Print the default configuration
//! thermalink config
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use thermalink::{
    Config, ConnectionRegistry, EventBus, JobRequest, Payload, PrinterConfig, Scheduler, ThermalinkError,
    protocol::render, transport::SimulatedLink,
};

/// Thermalink - Bluetooth thermal and label printer toolkit
#[derive(Parser, Debug)]
#[command(name = "thermalink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Printer profile, overriding the configuration file
    #[arg(long, global = true, value_enum)]
    printer: Option<Preset>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render a payload to printer bytes
    Render {
        /// Payload JSON file, or `-` for stdin
        payload: PathBuf,

        /// Write raw bytes to a file instead of a hex dump
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Show how the stream would be chunked for this MTU
        #[arg(long)]
        mtu: Option<usize>,
    },
    /// Run jobs through the scheduler against a simulated printer
    Simulate {
        /// JSON array of job requests, or `-` for stdin
        jobs: PathBuf,

        /// Number of chunk writes that fail before the link behaves
        #[arg(long, default_value = "0")]
        fail_writes: usize,

        /// Number of connect attempts that fail before the link behaves
        #[arg(long, default_value = "0")]
        fail_connects: usize,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Preset {
    /// 58mm receipt printer, ESC/POS
    Receipt58,
    /// 80mm receipt printer, ESC/POS
    Receipt80,
    /// 203 DPI label printer, TSPL
    Label,
}

impl Preset {
    fn printer_config(self) -> PrinterConfig {
        match self {
            Preset::Receipt58 => PrinterConfig::receipt_58mm(),
            Preset::Receipt80 => PrinterConfig::receipt_80mm(),
            Preset::Label => PrinterConfig::label_203dpi(),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "thermalink=debug" } else { "thermalink=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), ThermalinkError> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(preset) = cli.printer {
        config.printer = preset.printer_config();
    }

    match cli.command {
        Commands::Render { payload, output, mtu } => {
            let payload: Payload = parse_json(&read_input(&payload)?)?;
            let buffer = render(&payload, &config.printer)?;

            if let Some(path) = output {
                std::fs::write(&path, buffer.as_bytes())?;
                println!("Wrote {} bytes to {}", buffer.len(), path.display());
            } else {
                print_hex(buffer.as_bytes());
            }

            let mtu = mtu.unwrap_or(config.printer.mtu);
            let sizes: Vec<usize> = buffer.chunks(mtu).map(<[u8]>::len).collect();
            println!("{} bytes, {} chunks at MTU {}: {:?}", buffer.len(), sizes.len(), mtu, sizes);
        }
        Commands::Simulate {
            jobs,
            fail_writes,
            fail_connects,
        } => {
            let requests: Vec<JobRequest> = parse_json(&read_input(&jobs)?)?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(simulate(config, requests, fail_writes, fail_connects))?;
        }
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
        }
    }

    Ok(())
}

async fn simulate(
    config: Config,
    requests: Vec<JobRequest>,
    fail_writes: usize,
    fail_connects: usize,
) -> Result<(), ThermalinkError> {
    let link = Arc::new(SimulatedLink::new());
    link.fail_next_writes(fail_writes);
    link.fail_next_connects(fail_connects);

    let events = EventBus::default();
    let mut rx = events.subscribe();
    let registry = Arc::new(ConnectionRegistry::new(link.clone(), config.connection.clone(), events));
    let scheduler = Scheduler::new(config.scheduler, config.printer, registry.clone());

    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!(error = %e, "Unprintable event"),
                },
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "Event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    for request in requests {
        if let Err(e) = scheduler.enqueue(request) {
            warn!(error = %e, "Job not accepted");
        }
    }
    scheduler.start();
    scheduler.wait_until_idle().await;

    let stats = scheduler.stats();
    scheduler.shutdown().await;
    registry.disconnect_all().await;

    // The printer stops once the last bus sender is gone
    drop(scheduler);
    drop(registry);
    if let Err(e) = printer.await {
        warn!(error = %e, "Event printer failed");
    }

    info!(
        completed = stats.completed,
        failed = stats.failed,
        retried = stats.retried,
        chunks = link.write_count(),
        "Simulation finished"
    );
    let summary = serde_json::to_string_pretty(&stats).map_err(|e| ThermalinkError::Config(e.to_string()))?;
    eprintln!("{}", summary);
    Ok(())
}

fn read_input(path: &Path) -> Result<String, ThermalinkError> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, ThermalinkError> {
    serde_json::from_str(text).map_err(|e| ThermalinkError::InvalidJob(e.to_string()))
}

/// 16 bytes per row, offset then hex then printable ASCII
fn print_hex(bytes: &[u8]) {
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        println!("{:08x}  {:<47}  |{}|", row * 16, hex.join(" "), ascii);
    }
}
