use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A device is online while its last reading is younger than this.
pub const ONLINE_WINDOW_SECS: i64 = 300;

const LOW_MAX: i32 = 10;
const MEDIUM_MAX: i32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrowdStatus {
    Low,
    Medium,
    High,
}

impl CrowdStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrowdStatus::Low => "Low",
            CrowdStatus::Medium => "Medium",
            CrowdStatus::High => "High",
        }
    }
}

impl std::fmt::Display for CrowdStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Online,
    Offline,
}

impl Liveness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Liveness::Online => "online",
            Liveness::Offline => "offline",
        }
    }
}

impl std::fmt::Display for Liveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Maps a people count onto its crowd tier.
pub fn classify_crowd(count: i32) -> CrowdStatus {
    if count <= LOW_MAX {
        CrowdStatus::Low
    } else if count <= MEDIUM_MAX {
        CrowdStatus::Medium
    } else {
        CrowdStatus::High
    }
}

/// A device that never reported is offline.
pub fn is_online(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_seen {
        Some(seen) => now.signed_duration_since(seen) < Duration::seconds(ONLINE_WINDOW_SECS),
        None => false,
    }
}

pub fn liveness(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Liveness {
    if is_online(last_seen, now) {
        Liveness::Online
    } else {
        Liveness::Offline
    }
}
