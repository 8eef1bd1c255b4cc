use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::{classify_crowd, CrowdStatus, Liveness};

/// Registered ESP32 people counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_uid: String,
    pub device_name: String,
    pub shop_id: Option<Uuid>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Monitored location with its last-known crowd count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Shop {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub location: String,
    pub crowd_count: i32,
    pub is_public: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewShop {
    pub user_id: Uuid,
    pub name: String,
    pub location: String,
    pub is_public: bool,
}

#[derive(Debug, Clone)]
pub struct NewDevice {
    pub user_id: Uuid,
    pub device_uid: String,
    pub device_name: String,
    pub shop_id: Option<Uuid>,
}

/// Validated ingestion payload
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub device_id: String,
    pub people_count: i32,
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub success: bool,
    pub device_id: String,
    pub people_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crowd_status: Option<CrowdStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shop_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShopSnapshot {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub crowd_count: i32,
    pub crowd_status: CrowdStatus,
}

impl From<Shop> for ShopSnapshot {
    fn from(shop: Shop) -> Self {
        Self {
            crowd_status: classify_crowd(shop.crowd_count),
            id: shop.id,
            name: shop.name,
            location: shop.location,
            crowd_count: shop.crowd_count,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub device_id: String,
    pub device_name: String,
    pub status: Liveness,
    pub last_seen: Option<DateTime<Utc>>,
    pub shop: Option<ShopSnapshot>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicShop {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub crowd_count: i32,
    pub crowd_status: CrowdStatus,
    pub updated_at: DateTime<Utc>,
}

/// REST API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub data: Vec<PublicShop>,
    pub total: usize,
}

/// Per-owner overview of shops and devices
#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub shop_count: usize,
    pub device_count: usize,
    pub online_devices: usize,
    pub avg_crowd_count: i32,
    pub avg_crowd_status: CrowdStatus,
    pub top_shop: Option<ShopSnapshot>,
}
