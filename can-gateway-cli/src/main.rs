//! CAN Gateway CLI Application
//!
//! Runs the gateway between a SocketCAN interface and line-delimited JSON:
//! - Decoded inbound values are written to stdout as delta messages
//! - Outbound values are read from stdin as `{"path": ..., "value": ...}`
//!
//! The session runs until Ctrl-C or until stdin is closed.

use anyhow::{Context, Result};
use can_gateway::{CanTransport, GatewayConfig, MappingTable, MemoryBus, Session};
use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

mod config;
mod stream;

/// CAN Gateway - Bridge a CAN bus and a path-addressed data model
#[derive(Parser, Debug)]
#[command(name = "can-gateway-cli")]
#[command(about = "Bridge CAN frames to pub/sub values and back", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (gateway.toml)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override the CAN interface from the configuration
    #[arg(short, long, value_name = "NAME")]
    interface: Option<String>,

    /// Override the throttle interval in milliseconds
    #[arg(short, long, value_name = "MS")]
    throttle: Option<u64>,

    /// Validate the configuration, print the mappings and exit
    #[arg(long)]
    check: bool,

    /// Do not read outbound values from stdin
    #[arg(long)]
    no_stdin: bool,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("CAN Gateway CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using gateway library v{}", can_gateway::VERSION);

    log::info!("Loading configuration from: {:?}", args.config);
    let mut config = config::load_config(&args.config)?;
    if let Some(interface) = &args.interface {
        config.can_interface = interface.clone();
    }
    if let Some(throttle_ms) = args.throttle {
        config.throttle_ms = throttle_ms;
    }
    config.validate()?;

    if args.check {
        check_mode(&config)
    } else {
        run_mode(&config, !args.no_stdin)
    }
}

/// Check mode - print the resolved configuration and mappings
fn check_mode(config: &GatewayConfig) -> Result<()> {
    let table = MappingTable::build(&config.inputs, &config.outputs)?;
    let filter = config.rx_filter()?;
    let stats = table.stats();

    println!("═══════════════════════════════════════════════");
    println!("  CAN Gateway - Configuration Check");
    println!("═══════════════════════════════════════════════\n");

    println!("Interface: {}", config.can_interface);
    println!("Throttle:  {} ms", config.throttle_ms);
    println!("Filter:    ID 0x{:X} / mask 0x{:X}", filter.id, filter.mask);

    println!("\n📊 Mappings:");
    println!("  Inputs:   {}", stats.num_inputs);
    println!("  Outputs:  {}", stats.num_outputs);
    println!("  Realtime outputs: {}", stats.num_realtime);

    if !table.inputs().is_empty() {
        println!("\n⬇ Inputs");
        println!("───────────────────────────────────────────────");
        for input in table.inputs() {
            let passes = if filter.accepts(input.id) { "" } else { "  (blocked by filter)" };
            println!(
                "  0x{:<8X} {:<9} → {}{}",
                input.id,
                input.value_type,
                input.path,
                passes
            );
        }
    }

    if !table.outputs().is_empty() {
        println!("\n⬆ Outputs");
        println!("───────────────────────────────────────────────");
        for output in table.outputs() {
            println!(
                "  {} → 0x{:<8X} {}{}",
                output.path,
                output.id,
                output.value_type,
                if output.realtime { " [realtime]" } else { "" }
            );
        }
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Run mode - start the session and stream values until shutdown
fn run_mode(config: &GatewayConfig, read_stdin: bool) -> Result<()> {
    let transport = open_transport(&config.can_interface)?;
    let bus = Arc::new(MemoryBus::new(can_gateway::SOURCE_LABEL));

    let mut session = Session::start(config, transport, bus.clone(), bus.clone())
        .context("Failed to start gateway session")?;

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

    let ctrlc_tx = shutdown_tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.try_send(());
    })
    .context("Failed to install Ctrl-C handler")?;

    if read_stdin {
        let input_bus = bus.clone();
        let eof_tx = shutdown_tx.clone();
        thread::Builder::new()
            .name("stdin-reader".to_string())
            .spawn(move || {
                stream::read_values(io::stdin().lock(), &input_bus);
                let _ = eof_tx.try_send(());
            })
            .context("Failed to start stdin reader")?;
    }

    let updates = bus.updates();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    loop {
        crossbeam_channel::select! {
            recv(updates) -> update => match update {
                Ok(update) => {
                    if let Err(e) = stream::write_update(&mut out, &update) {
                        log::error!("Failed to write update: {:#}", e);
                        break;
                    }
                }
                Err(_) => break,
            },
            recv(shutdown_rx) -> _ => break,
        }
    }

    log::info!("Shutting down");
    session.stop();

    let stats = session.stats();
    log::info!(
        "Frames received: {}, published: {}, throttled: {}, unmapped: {}, decode errors: {}",
        stats.frames_received,
        stats.values_published,
        stats.frames_throttled,
        stats.frames_unmapped,
        stats.decode_errors
    );

    Ok(())
}

#[cfg(target_os = "linux")]
fn open_transport(interface: &str) -> Result<Arc<dyn CanTransport>> {
    let transport = can_gateway::transport::SocketCanTransport::open(interface)
        .with_context(|| format!("Failed to open CAN interface {}", interface))?;
    Ok(Arc::new(transport))
}

#[cfg(not(target_os = "linux"))]
fn open_transport(interface: &str) -> Result<Arc<dyn CanTransport>> {
    anyhow::bail!("CAN interface {} unavailable: SocketCAN requires Linux", interface)
}

/// Initialize logging based on verbosity level
///
/// Logs go to stderr so stdout carries only delta messages.
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::{Builder, Target};
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
        .target(Target::Stderr)
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
