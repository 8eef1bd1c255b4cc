use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Body posted to `/esp32-update`
#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub device_id: String,
    pub people_count: u32,
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateReply {
    pub crowd_status: Option<String>,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorReply {
    pub error: String,
    pub details: Option<String>,
}

/// People counter that drifts like foot traffic through a doorway.
#[derive(Debug, Clone)]
pub struct Counter {
    count: u32,
    capacity: u32,
}

impl Counter {
    pub fn new(capacity: u32) -> Self {
        Self { count: 0, capacity }
    }

    pub fn step(&mut self, rng: &mut impl Rng) -> u32 {
        let delta: i64 = if rng.gen_bool(0.05) {
            rng.gen_range(-15..=15) // 5% bursts: a group arriving or leaving
        } else {
            rng.gen_range(-3..=3)
        };
        self.count = (self.count as i64 + delta).clamp(0, self.capacity as i64) as u32;
        self.count
    }
}
