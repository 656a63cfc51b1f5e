//! # Crane HAL Gateway Binary
//!
//! Reads crane controller, stability sensor and load-cell data over the
//! configured field buses and publishes CRC-checked telemetry frames.
//!
//! # Usage
//!
//! ```bash
//! # Run against real hardware
//! crane_hal --config /etc/crane/gateway.toml
//!
//! # Bench run: every worker simulated, frames only logged
//! crane_hal --config config/gateway.toml --simulate --no-mqtt
//!
//! # Verbose JSON logs
//! crane_hal -c config/gateway.toml -v --json
//! ```

use clap::Parser;
use crane_common::config::{ConfigLoader, LogLevel};
use crane_common::consts::DEFAULT_CONFIG_PATH;
use crane_common::hal::config::GatewayConfig;
use crane_common::hal::consts::DRIVER_SIMULATION;
use crane_hal::core::HalCore;
use crane_hal::driver_registry::DriverRegistry;
use crane_hal::inbound::InboundMessage;
use crane_hal::mqtt::MqttTransport;
use crane_hal::publisher::{LogPublisher, MessageTransport};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc::Receiver;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Crane HAL Gateway - field-bus acquisition and telemetry publishing
#[derive(Parser, Debug)]
#[command(name = "crane_hal")]
#[command(version)]
#[command(about = "Crane sensor acquisition and telemetry publishing with pluggable transport drivers")]
#[command(long_about = None)]
struct Args {
    /// Path to the gateway configuration file (gateway.toml)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Force simulation driver on every acquisition worker
    #[arg(short = 's', long)]
    simulate: bool,

    /// Log frames instead of publishing them over MQTT
    #[arg(long)]
    no_mqtt: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("Gateway startup failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load before tracing so the configured level applies; report after.
    let loaded = GatewayConfig::load(&args.config);
    let configured_level = loaded
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, configured_level);

    info!("Crane HAL Gateway v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Loading configuration from {:?}", args.config);
    let mut config = loaded?;

    if args.simulate {
        info!("Simulation mode enabled (all workers)");
        config.force_driver(DRIVER_SIMULATION);
    }

    let (transport, inbound) = build_transport(&args, &config)?;

    let registry = DriverRegistry::with_builtin_drivers();
    let mut hal_core = HalCore::new(config, &registry, transport, inbound)?;

    // Setup signal handler.
    let running = hal_core.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    hal_core.start()?;

    if let Err(e) = hal_core.run() {
        error!("Supervisor error: {}", e);
    }

    hal_core.shutdown()?;

    info!("Crane HAL Gateway shutdown complete");
    Ok(())
}

type TransportParts = (Arc<dyn MessageTransport>, Option<Receiver<InboundMessage>>);

/// Pick the messaging transport: MQTT when configured, else log-only.
fn build_transport(
    args: &Args,
    config: &GatewayConfig,
) -> Result<TransportParts, Box<dyn std::error::Error>> {
    match (&config.mqtt, args.no_mqtt) {
        (Some(mqtt), false) => {
            let (transport, inbound) = MqttTransport::connect(mqtt)?;
            Ok((Arc::new(transport), Some(inbound)))
        }
        (Some(_), true) => {
            info!("MQTT disabled from CLI; frames are logged only");
            Ok((Arc::new(LogPublisher::new()), None))
        }
        (None, _) => {
            warn!("No [mqtt] section; frames are logged only");
            Ok((Arc::new(LogPublisher::new()), None))
        }
    }
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        configured
    };

    let filter = EnvFilter::from_default_env().add_directive(
        level
            .as_directive()
            .parse()
            .unwrap_or_else(|_| Level::INFO.into()),
    );

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
