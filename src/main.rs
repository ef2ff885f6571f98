//! Edgelink device runtime - main entry point
//!
//! Boot order follows the device contract: logging first, then link
//! supervision, then identity (fatal when unresolvable), then the broker
//! session. This file is the only place that terminates the process.

use clap::{Parser, Subcommand};
use edgelink::config::DeviceConfig;
use edgelink::connectivity::{spawn_event_pump, ConnectivityMonitor, ConnectivitySignal, HostLink};
use edgelink::error::FatalError;
use edgelink::identity::{DeviceIdentity, FactorySerial, IdentityProvider};
use edgelink::observability::{init_default_logging, metrics};
use edgelink::session::{MqttSession, SessionManager, SessionParams};
use edgelink::status::{DisplayBuffer, StatusSink};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Device connectivity and telemetry runtime
#[derive(Parser)]
#[command(name = "edgelink")]
#[command(about = "Device connectivity and telemetry runtime")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the device runtime
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting edgelink v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_device(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {e}");
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<DeviceConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(DeviceConfig::load_from_file(path)?)
        }
        None => {
            // Try default locations
            let default_paths = vec![
                "edgelink.toml",
                "config/edgelink.toml",
                "/etc/edgelink/edgelink.toml",
            ];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(DeviceConfig::load_from_file(&path)?);
                }
            }

            error!(
                "No configuration file found. Please provide one with -c/--config or create edgelink.toml"
            );
            process::exit(1);
        }
    }
}

async fn run_device(config: DeviceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let sink = Arc::new(DisplayBuffer::new(config.device.status_lines));

    // Link acquisition starts before anything else so it proceeds while
    // identity resolves. The pump runs for as long as the process lives.
    let signal_flags = Arc::new(ConnectivitySignal::new());
    let (event_tx, event_rx) = mpsc::channel(16);
    let monitor = ConnectivityMonitor::new(
        HostLink::new(event_tx),
        sink.clone() as Arc<dyn StatusSink>,
        signal_flags.clone(),
    );
    let _pump = spawn_event_pump(monitor, event_rx);

    // Identity is fatal when unresolvable; nothing downstream runs without it.
    let identity = resolve_identity(&config)?;
    info!(identity = %identity, "Device identity resolved");
    sink.append_line(&format!("DeviceId: {identity}"));

    let manager = build_session_manager(&config, &identity, sink, signal_flags)?;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    let outcome = tokio::select! {
        // The session loop only returns on a fatal error; surface it so
        // the exit path in main is the one that ends the process.
        result = manager.run() => result,
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
            Ok(())
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
            Ok(())
        }
    };

    let snapshot = metrics().get_metrics();
    info!(
        connection_attempts = snapshot.session.connection_attempts,
        reconnects = snapshot.session.reconnects_completed,
        published_qos0 = snapshot.telemetry.published_qos0,
        published_qos1 = snapshot.telemetry.published_qos1,
        received = snapshot.telemetry.messages_received,
        "Final session metrics"
    );

    outcome?;
    Ok(())
}

fn resolve_identity(config: &DeviceConfig) -> Result<DeviceIdentity, FatalError> {
    let element = FactorySerial::new(&config.device.serial_path);
    let identity = IdentityProvider::new(element).resolve()?;
    Ok(identity)
}

/// Bootstrap factory - wires the broker session from deployment facts.
fn build_session_manager(
    config: &DeviceConfig,
    identity: &DeviceIdentity,
    sink: Arc<DisplayBuffer>,
    signal_flags: Arc<ConnectivitySignal>,
) -> Result<SessionManager<MqttSession>, FatalError> {
    let params =
        SessionParams::from_config(identity, &config.broker).map_err(FatalError::session_init)?;
    let session = MqttSession::new(params);

    Ok(SessionManager::new(
        session,
        identity,
        sink,
        signal_flags,
        config.device.greeting.clone(),
    ))
}

fn handle_config_command(
    config: DeviceConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
