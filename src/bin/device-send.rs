//! Device message injection utility
//!
//! Publishes a message into a device's subscription space. Devices subscribe
//! to `<identity>/#`, so anything sent under their identity shows up on
//! their session.
//!
//! ## Usage
//!
//! ```bash
//! # Send a command to a device
//! device-send --device 01239280AB5F0011EE --payload '{"led": "on"}'
//!
//! # Use a different channel under the device's topic space
//! device-send --device 01239280AB5F0011EE --channel config --payload '{"interval": 5}'
//! ```

use clap::Parser;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::{sleep, Duration};

#[derive(Parser)]
#[command(
    name = "device-send",
    about = "Send a message into an edgelink device's topic space"
)]
struct Args {
    /// Target device identity (hex serial)
    #[arg(long, required = true)]
    device: String,

    /// Channel under the device's topic space
    #[arg(long, default_value = "command")]
    channel: String,

    /// Message payload (JSON or plain text)
    #[arg(long, required = true)]
    payload: String,

    /// QoS level for the publish (0 or 1)
    #[arg(long, default_value_t = 1)]
    qos: u8,

    /// MQTT broker host
    #[arg(long, default_value = "localhost")]
    broker_host: String,

    /// MQTT broker port
    #[arg(long, default_value_t = 1883)]
    broker_port: u16,
}

struct Sender {
    client: AsyncClient,
}

impl Sender {
    async fn new(broker_host: &str, broker_port: u16) -> Result<Self, Box<dyn std::error::Error>> {
        let client_id = format!(
            "device-send-{}",
            SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs()
        );

        let mut mqtt_options = MqttOptions::new(client_id, broker_host, broker_port);
        mqtt_options.set_keep_alive(Duration::from_secs(60));

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10);

        // Start event loop in background
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(_) => {}
                    Err(e) => {
                        eprintln!("MQTT eventloop error: {e}");
                        break;
                    }
                }
            }
        });

        // Wait for connection
        println!("Connecting to MQTT broker {broker_host}:{broker_port}...");
        sleep(Duration::from_millis(1000)).await;

        Ok(Sender { client })
    }

    async fn send(&self, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
        let topic = format!("{}/{}", args.device, args.channel);
        let qos = match args.qos {
            0 => QoS::AtMostOnce,
            _ => QoS::AtLeastOnce,
        };

        println!("\nSending to {topic}");
        println!("   QoS: {}", args.qos);
        println!("   Payload: {}", args.payload);

        self.client
            .publish(topic, qos, false, args.payload.clone())
            .await?;

        println!("Message sent");

        // Brief pause to allow message delivery
        sleep(Duration::from_millis(500)).await;

        println!("\nWatch the device's topic space with:");
        println!(
            "   cargo run --bin device-watch -- --device {}",
            args.device
        );

        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Reject malformed JSON early; plain text payloads are allowed
    if args.payload.trim_start().starts_with('{')
        && serde_json::from_str::<serde_json::Value>(&args.payload).is_err()
    {
        eprintln!("Payload looks like JSON but does not parse");
        std::process::exit(1);
    }

    let sender = Sender::new(&args.broker_host, args.broker_port).await?;

    if let Err(e) = sender.send(&args).await {
        eprintln!("Failed to send message: {e}");
        std::process::exit(1);
    }

    Ok(())
}
