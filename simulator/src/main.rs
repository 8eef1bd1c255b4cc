mod reading;

use clap::Parser;
use rand::Rng;
use reading::{Counter, ErrorReply, Reading, UpdateReply};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Simulates ESP32 people counters posting readings to the ingestor
#[derive(Parser, Debug, Clone)]
#[command(name = "crowd-simulator")]
struct Cli {
    /// Base URL of the ingestor
    #[arg(long, env = "INGEST_URL", default_value = "http://localhost:8080")]
    url: String,

    /// Owner API key shared by all simulated devices
    #[arg(long, env = "API_KEY")]
    api_key: String,

    /// Comma-separated device ids as registered with the ingestor
    #[arg(long, env = "DEVICES", value_delimiter = ',', default_value = "esp-door")]
    devices: Vec<String>,

    /// Seconds between readings per device
    #[arg(long, env = "INTERVAL_SECS", default_value_t = 10)]
    interval_secs: u64,

    /// Upper bound of simulated people per device
    #[arg(long, env = "CAPACITY", default_value_t = 60)]
    capacity: u32,
}

enum Outcome {
    Accepted,
    Retry,
    Stop,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!("Starting ESP32 crowd simulator");
    info!(
        "Target: {}, Devices: {}, Interval: {}s",
        cli.url,
        cli.devices.len(),
        cli.interval_secs
    );

    let client = match Client::builder().timeout(Duration::from_secs(10)).build() {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };
    let endpoint = format!("{}/esp32-update", cli.url.trim_end_matches('/'));

    let mut handles = Vec::with_capacity(cli.devices.len());
    for device_id in cli.devices.iter().filter(|d| !d.is_empty()).cloned() {
        let client = client.clone();
        let endpoint = endpoint.clone();
        let cli = cli.clone();
        handles.push(tokio::spawn(async move {
            run_device(client, endpoint, device_id, cli).await;
        }));
    }

    tokio::select! {
        _ = wait_all(handles) => {
            warn!("All simulated devices stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }
}

async fn wait_all(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            error!("Device task failed: {}", e);
        }
    }
}

async fn run_device(client: Client, endpoint: String, device_id: String, cli: Cli) {
    let interval = Duration::from_secs(cli.interval_secs.max(1));
    let mut counter = Counter::new(cli.capacity);

    // Spread devices out so they do not all report on the same tick
    let jitter = rand::thread_rng().gen_range(0..interval.as_millis() as u64);
    tokio::time::sleep(Duration::from_millis(jitter)).await;

    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let people_count = counter.step(&mut rand::thread_rng());
        let reading = Reading {
            device_id: device_id.clone(),
            people_count,
            api_key: cli.api_key.clone(),
        };

        match send_reading(&client, &endpoint, &reading).await {
            Outcome::Accepted | Outcome::Retry => {}
            Outcome::Stop => {
                error!("Device {} stopped: fix its registration or API key", device_id);
                return;
            }
        }
    }
}

async fn send_reading(client: &Client, endpoint: &str, reading: &Reading) -> Outcome {
    let resp = match client.post(endpoint).json(reading).send().await {
        Ok(resp) => resp,
        Err(e) => {
            warn!("Device {}: request failed: {}", reading.device_id, e);
            return Outcome::Retry;
        }
    };

    let status = resp.status();
    if status.is_success() {
        match resp.json::<UpdateReply>().await {
            Ok(reply) => {
                match (&reply.crowd_status, &reply.message) {
                    (Some(tier), _) => info!(
                        "Device {}: {} people, {} at {}",
                        reading.device_id, reading.people_count, tier, reply.timestamp
                    ),
                    (None, Some(message)) => info!("Device {}: {}", reading.device_id, message),
                    (None, None) => debug!("Device {}: accepted", reading.device_id),
                }
                Outcome::Accepted
            }
            Err(e) => {
                warn!("Device {}: unreadable reply: {}", reading.device_id, e);
                Outcome::Accepted
            }
        }
    } else {
        let reason = resp
            .json::<ErrorReply>()
            .await
            .map(|r| match r.details {
                Some(details) => format!("{} ({})", r.error, details),
                None => r.error,
            })
            .unwrap_or_else(|_| status.to_string());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
                error!("Device {}: rejected with {}: {}", reading.device_id, status, reason);
                Outcome::Stop
            }
            _ => {
                warn!(
                    "Device {}: {} {}, retrying next interval",
                    reading.device_id, status, reason
                );
                Outcome::Retry
            }
        }
    }
}
