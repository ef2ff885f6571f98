//! Device telemetry watcher
//!
//! Subscribes to a device's topic space and prints everything it publishes,
//! classified by telemetry tier. Meant for bench brokers; production fleets
//! authenticate with mutual TLS and are watched from the cloud side.
//!
//! ## Usage
//!
//! ```bash
//! # Watch one device
//! device-watch --device 01239280AB5F0011EE
//!
//! # Watch every device on the broker, one line per message
//! device-watch --format compact
//! ```

use clap::Parser;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Telemetry watcher for edgelink devices
#[derive(Parser)]
#[command(name = "device-watch")]
#[command(about = "Watch telemetry published by edgelink devices")]
#[command(version)]
struct Args {
    /// Device identity to watch (hex serial); watches all devices when omitted
    #[arg(short, long)]
    device: Option<String>,

    /// Output format (pretty, compact, or json)
    #[arg(short, long, default_value = "pretty")]
    format: OutputFormat,

    /// MQTT broker host
    #[arg(long, default_value = "localhost")]
    broker_host: String,

    /// MQTT broker port
    #[arg(long, default_value_t = 1883)]
    broker_port: u16,

    /// MQTT username (optional)
    #[arg(long)]
    username: Option<String>,

    /// MQTT password (optional)
    #[arg(long)]
    password: Option<String>,
}

/// Output formatting options
#[derive(Clone, Debug, clap::ValueEnum)]
enum OutputFormat {
    /// Color-coded, human-readable with timestamps (default)
    Pretty,
    /// Single line per message, minimal formatting
    Compact,
    /// Raw JSON output for programmatic processing
    Json,
}

/// Message classification by telemetry tier
#[derive(Debug, Clone, PartialEq)]
enum MessageKind {
    /// Fire-and-forget telemetry ("type": "QOS0")
    TelemetryQos0,
    /// Acknowledged telemetry ("type": "QOS1")
    TelemetryQos1,
    /// Anything else in the device's topic space
    Other,
}

impl MessageKind {
    fn from_payload(payload: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(value) => match value.get("type").and_then(|tier| tier.as_str()) {
                Some("QOS0") => Self::TelemetryQos0,
                Some("QOS1") => Self::TelemetryQos1,
                _ => Self::Other,
            },
            Err(_) => Self::Other,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::TelemetryQos0 => "QOS0",
            Self::TelemetryQos1 => "QOS1",
            Self::Other => "OTHER",
        }
    }

    fn color_code(&self) -> &'static str {
        match self {
            Self::TelemetryQos0 => "\x1b[1;32m", // Green
            Self::TelemetryQos1 => "\x1b[1;36m", // Cyan
            Self::Other => "\x1b[0;37m",         // White
        }
    }
}

const RESET: &str = "\x1b[0m";

fn format_message(
    kind: &MessageKind,
    topic: &str,
    payload: &str,
    format: &OutputFormat,
) -> String {
    let timestamp = chrono::Utc::now().format("%H:%M:%S");

    match format {
        OutputFormat::Json => {
            let json_output = serde_json::json!({
                "timestamp": timestamp.to_string(),
                "kind": kind.label(),
                "topic": topic,
                "payload": if let Ok(json) = serde_json::from_str::<serde_json::Value>(payload) {
                    json
                } else {
                    serde_json::Value::String(payload.to_string())
                }
            });
            serde_json::to_string(&json_output).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Compact => format!(
            "{} [{}] {} {}",
            timestamp,
            kind.label(),
            topic,
            payload.replace('\n', " ").trim()
        ),
        OutputFormat::Pretty => {
            let color = kind.color_code();
            let label = kind.label();

            let formatted_payload =
                if let Ok(json) = serde_json::from_str::<serde_json::Value>(payload) {
                    serde_json::to_string_pretty(&json).unwrap_or_else(|_| payload.to_string())
                } else {
                    payload.to_string()
                };

            format!("{color}[{label}]{RESET} {timestamp} {topic}\n{formatted_payload}\n")
        }
    }
}

fn topic_filter(device: &Option<String>) -> String {
    match device {
        Some(identity) => format!("{identity}/#"),
        None => "#".to_string(),
    }
}

fn setup_mqtt_client(args: &Args) -> (AsyncClient, EventLoop) {
    // Unique client id so several watchers can share a broker
    let client_id = format!("device-watch-{}", std::process::id());
    let mut mqtt_options = MqttOptions::new(client_id, &args.broker_host, args.broker_port);

    if let (Some(username), Some(password)) = (&args.username, &args.password) {
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_keep_alive(std::time::Duration::from_secs(60));
    mqtt_options.set_clean_session(true);

    AsyncClient::new(mqtt_options, 100)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("device_watch=info,rumqttc=warn")
        .init();

    let args = Args::parse();
    let filter = topic_filter(&args.device);

    println!("edgelink - Device Telemetry Watcher");
    println!("===================================");
    match &args.device {
        Some(identity) => println!("Device: {identity}"),
        None => println!("Device: all"),
    }
    println!("Filter: {filter}");
    println!("MQTT Broker: {}:{}", args.broker_host, args.broker_port);
    println!("Press Ctrl+C to stop watching");
    println!();

    // Handle Ctrl+C gracefully
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received...");
        shutdown_clone.store(true, Ordering::Relaxed);

        // If we don't exit within 2 seconds, force exit
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        warn!("Graceful shutdown timed out, forcing exit");
        std::process::exit(0);
    });

    // Main connection loop with automatic reconnection
    let mut reconnect_delay = 1;
    const MAX_RECONNECT_DELAY: u64 = 30;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutting down watcher...");
            break;
        }

        info!("Connecting to MQTT broker...");
        let (client, mut eventloop) = setup_mqtt_client(&args);

        if let Err(e) = client.subscribe(&filter, QoS::AtLeastOnce).await {
            error!("Failed to subscribe: {}", e);
            tokio::time::sleep(std::time::Duration::from_secs(reconnect_delay)).await;
            reconnect_delay = std::cmp::min(reconnect_delay * 2, MAX_RECONNECT_DELAY);
            continue;
        }

        // Reset reconnect delay on successful connection
        reconnect_delay = 1;
        let mut connection_stable = false;

        // Process MQTT events until disconnection
        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Disconnecting from MQTT broker...");
                let disconnect_timeout = tokio::time::timeout(
                    std::time::Duration::from_millis(500),
                    client.disconnect(),
                )
                .await;

                if disconnect_timeout.is_err() {
                    warn!("Disconnect timed out, forcing exit");
                }
                return Ok(());
            }

            // Poll with timeout to allow regular shutdown checks
            let poll_result =
                tokio::time::timeout(std::time::Duration::from_millis(100), eventloop.poll())
                    .await;

            match poll_result {
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    let payload = String::from_utf8_lossy(&publish.payload);
                    let kind = MessageKind::from_payload(&payload);
                    let formatted =
                        format_message(&kind, &publish.topic, &payload, &args.format);

                    match args.format {
                        OutputFormat::Pretty => print!("{formatted}\n"),
                        _ => println!("{formatted}"),
                    }
                }
                Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => {
                    info!("Connected to MQTT broker");
                    connection_stable = true;
                }
                Ok(Ok(Event::Incoming(Packet::SubAck(_)))) => {
                    info!("Subscribed to {}", filter);
                }
                Ok(Ok(_)) => {} // Ignore other events
                Ok(Err(e)) => {
                    if connection_stable {
                        warn!("MQTT connection lost: {}", e);
                    } else {
                        error!("MQTT connection error during setup: {}", e);
                    }
                    break; // Exit inner loop to reconnect
                }
                Err(_) => {
                    // Timeout occurred, continue to check for shutdown
                    continue;
                }
            }
        }

        // Connection lost, wait before reconnecting
        if !shutdown.load(Ordering::Relaxed) {
            warn!("Reconnecting in {} seconds...", reconnect_delay);
            tokio::time::sleep(std::time::Duration::from_secs(reconnect_delay)).await;
            reconnect_delay = std::cmp::min(reconnect_delay * 2, MAX_RECONNECT_DELAY);
        }
    }

    Ok(())
}
