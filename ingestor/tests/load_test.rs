//! Load tests against a running ingestor.
//!
//! Start the service with `STORE_BACKEND=memory SEED_FILE=...` (or against
//! Postgres after registering devices with `crowdctl`), then run with
//! `cargo test --test load_test -- --ignored --nocapture`.

use rand::Rng;
use reqwest::Client;
use serde::Serialize;
use std::env;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
struct Reading {
    device_id: String,
    people_count: u32,
    api_key: String,
}

struct Target {
    url: String,
    api_key: String,
    devices: Vec<String>,
}

fn target() -> Target {
    let base = env::var("INGEST_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    Target {
        url: format!("{}/esp32-update", base.trim_end_matches('/')),
        api_key: env::var("API_KEY").unwrap_or_else(|_| "dev-key".to_string()),
        devices: env::var("DEVICES")
            .unwrap_or_else(|_| "esp-door".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

async fn run_load(
    target: &Target,
    total_requests: usize,
    concurrency: usize,
) -> (usize, usize, Duration) {
    let client = Client::new();
    let start = Instant::now();
    let mut sent = 0;
    let mut errors = 0;

    for batch_start in (0..total_requests).step_by(concurrency) {
        let batch_end = std::cmp::min(batch_start + concurrency, total_requests);
        let mut handles = Vec::with_capacity(batch_end - batch_start);

        for i in batch_start..batch_end {
            let reading = Reading {
                device_id: target.devices[i % target.devices.len()].clone(),
                people_count: rand::thread_rng().gen_range(0..60),
                api_key: target.api_key.clone(),
            };
            let client = client.clone();
            let url = target.url.clone();
            handles.push(tokio::spawn(async move {
                client.post(url).json(&reading).send().await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(resp)) if resp.status().is_success() => sent += 1,
                Ok(Ok(resp)) => {
                    errors += 1;
                    if errors < 10 {
                        eprintln!("Unexpected status: {}", resp.status());
                    }
                }
                Ok(Err(e)) => {
                    errors += 1;
                    if errors < 10 {
                        eprintln!("Send error: {}", e);
                    }
                }
                Err(e) => {
                    errors += 1;
                    eprintln!("Task error: {}", e);
                }
            }
        }
    }

    (sent, errors, start.elapsed())
}

#[tokio::test]
#[ignore]
async fn test_500_readings_per_second() {
    let target = target();
    assert!(!target.devices.is_empty(), "DEVICES must name at least one device");

    let total_requests = 5_000;
    println!("\nLoad test: {} readings to {}", total_requests, target.url);
    println!("  Devices: {}", target.devices.len());

    let (sent, errors, duration) = run_load(&target, total_requests, 50).await;
    let rate = sent as f64 / duration.as_secs_f64();

    println!("\nResults:");
    println!("  Accepted:  {}", sent);
    println!("  Errors:    {}", errors);
    println!("  Duration:  {:.2}s", duration.as_secs_f64());
    println!("  Rate:      {:.2} req/s", rate);

    assert_eq!(errors, 0, "Too many errors: {} (expected 0)", errors);
    assert!(rate >= 500.0, "Throughput too low: {:.2} req/s", rate);
}

#[tokio::test]
#[ignore]
async fn test_status_after_load_reports_online() {
    let target = target();
    let (sent, errors, _) = run_load(&target, 100, 10).await;
    assert_eq!(errors, 0);
    assert_eq!(sent, 100);

    let status_url = target.url.replace("/esp32-update", "/esp32-status");
    let body: serde_json::Value = Client::new()
        .get(status_url)
        .query(&[
            ("device_id", target.devices[0].as_str()),
            ("api_key", target.api_key.as_str()),
        ])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "online");
}
