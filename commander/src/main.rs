//! # Commander Binary
//!
//! Composition root: builds the command catalog once, wires the message
//! bus, command interpreter and serial transport, pushes the component
//! address table to the marshaller, then reads operator commands from
//! stdin until Ctrl-C, `quit` or end of input.
//!
//! # Usage
//!
//! ```bash
//! # Real marshaller on the default serial device
//! commander --config /etc/commander/commander.toml
//!
//! # Loopback link, no hardware needed
//! commander -s -v
//!
//! # Scripted session
//! printf 'z_up z\nmove_rel x 5\n' | commander --device /dev/ttyUSB0
//! ```

#![deny(warnings)]

mod console;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use commander_command::{CommandInterpreter, PrefixInterlock, send_bootstrap};
use commander_common::consts::DEFAULT_CONFIG_PATH;
use commander_common::prelude::*;
use commander_link::{ForwardToBus, LinkRegistry, LinkSettings, SerialTransport, TransportConfig};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Commander - drives the marshaller over its serial link
#[derive(Parser, Debug)]
#[command(name = "commander")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Expands operator commands into per-axis commands and sends them to the marshaller")]
#[command(long_about = None)]
struct Args {
    /// Path to configuration file. Built-in defaults apply if omitted and
    /// the default path does not exist.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use the in-memory loopback link instead of the configured driver
    #[arg(short = 's', long)]
    simulate: bool,

    /// Override the serial device path
    #[arg(short, long, value_name = "PATH")]
    device: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("Commander failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loaded = load_config(args.config.as_deref());
    let level = loaded
        .as_ref()
        .map(|(config, _)| config.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, level);

    let (mut config, source) = loaded?;
    match source {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("No configuration at {}, using defaults", DEFAULT_CONFIG_PATH),
    }
    if let Some(device) = &args.device {
        config.link.device = device.clone();
    }
    config.validate()?;

    info!(
        "Commander v{} starting as '{}'",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name
    );

    let directory = load_directory(&config.directory.path);

    let catalogs = CatalogCell::new();
    let catalog = catalogs.get_or_build()?;

    let bus = Arc::new(MessageBus::new());
    let commander_id = SubscriberId::new(COMMANDER_ID)?;
    bus.register(commander_id.clone(), |envelope: Envelope| -> Result<(), BusError> {
        info!("{}", envelope);
        Ok(())
    });

    let mut interpreter = CommandInterpreter::new(Arc::clone(&bus), Arc::clone(&catalog))?;
    let interlock = PrefixInterlock::from_section(&config.interlock);
    if !interlock.is_empty() {
        interpreter = interpreter.with_stage(interlock);
    }

    let sink = ForwardToBus::new(Arc::clone(&bus), commander_id)?;
    let mut transport = SerialTransport::new(
        &bus,
        TransportConfig::from_section(&config.transport),
        Arc::new(sink),
    )?;

    let driver = if args.simulate {
        info!("Simulation mode enabled (memory loopback link)");
        "memory"
    } else {
        config.link.driver.as_str()
    };
    let registry = LinkRegistry::with_builtin()?;
    let settings = LinkSettings::new(config.link.device.clone());
    transport.start(|| registry.open(driver, &settings))?;

    let running = transport.running_flag();
    let signal_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        signal_flag.store(false, Ordering::SeqCst);
    })?;

    let delay = Duration::from_millis(config.directory.bootstrap_delay_ms);
    if sleep_while_running(&running, delay) {
        if let Err(e) = send_bootstrap(&interpreter, &directory) {
            error!("Address table push failed: {}", e);
        }
    }

    console::run(&interpreter, &transport, &running);

    transport.stop();
    let stats = transport.stats();
    info!(
        "Sent {} command(s), {} failed, {} dropped; received {} frame(s)",
        stats.writes, stats.write_errors, stats.dropped, stats.frames_in
    );
    info!("Commander shutdown complete");
    Ok(())
}

/// Load the explicit config, or the default path falling back to built-in defaults.
fn load_config(path: Option<&Path>) -> Result<(CommanderConfig, Option<PathBuf>), ConfigError> {
    match path {
        Some(path) => Ok((CommanderConfig::load(path)?, Some(path.to_path_buf()))),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            match CommanderConfig::load(default_path) {
                Ok(config) => Ok((config, Some(default_path.to_path_buf()))),
                Err(ConfigError::FileNotFound) => Ok((CommanderConfig::default(), None)),
                Err(e) => Err(e),
            }
        }
    }
}

/// Load the component directory. A missing or broken file leaves it empty.
fn load_directory(path: &Path) -> JsonComponentStore {
    match JsonComponentStore::load(path) {
        Ok(store) => {
            info!(
                "Component directory {:?}: {} paired component(s)",
                path,
                store.keywords().len()
            );
            store
        }
        Err(e) => {
            warn!("Component directory unavailable ({}). No addresses will be pushed.", e);
            JsonComponentStore::default()
        }
    }
}

/// Sleep for `delay` unless the flag clears first. Returns whether still running.
fn sleep_while_running(running: &AtomicBool, delay: Duration) -> bool {
    let deadline = Instant::now() + delay;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(50)));
    }
    false
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
///
/// `RUST_LOG` takes precedence when set.
fn setup_tracing(args: &Args, level: LogLevel) {
    let default_directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        level.as_directive()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
