use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::auth::generate_api_key;
use crate::classify::{classify_crowd, is_online};
use crate::errors::{Error, Result};
use crate::model::{DashboardSummary, Device, NewDevice, NewShop, Shop, ShopSnapshot};
use crate::store::Store;

pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Issues a fresh API key, invalidating the previous one at once.
pub async fn regenerate_api_key<S: Store>(store: &S, user_id: Uuid) -> Result<String> {
    let api_key = generate_api_key();
    store.set_api_key(user_id, &api_key).await?;
    info!("Regenerated API key for user {}", user_id);
    Ok(api_key)
}

pub async fn api_key_for<S: Store>(store: &S, user_id: Uuid) -> Result<String> {
    store
        .api_key_for(user_id)
        .await?
        .ok_or_else(|| Error::NotFound("No API key for this user".to_string()))
}

pub async fn create_shop<S: Store>(
    store: &S,
    user_id: Uuid,
    name: &str,
    location: &str,
    is_public: bool,
) -> Result<Shop> {
    let (name, location) = shop_fields(name, location)?;

    let shop = store
        .insert_shop(
            NewShop {
                user_id,
                name: name.to_string(),
                location: location.to_string(),
                is_public,
            },
            Utc::now(),
        )
        .await?;
    info!("Created shop {} ({})", shop.name, shop.id);
    Ok(shop)
}

pub async fn update_shop<S: Store>(
    store: &S,
    user_id: Uuid,
    shop_id: Uuid,
    name: &str,
    location: &str,
) -> Result<Shop> {
    let (name, location) = shop_fields(name, location)?;

    let shop = store
        .update_shop(user_id, shop_id, name, location)
        .await?
        .ok_or_else(|| Error::NotFound("Shop not found".to_string()))?;
    info!("Updated shop {} ({})", shop.name, shop.id);
    Ok(shop)
}

fn shop_fields<'a>(name: &'a str, location: &'a str) -> Result<(&'a str, &'a str)> {
    let (name, location) = (name.trim(), location.trim());
    if name.is_empty() || location.is_empty() {
        return Err(Error::Validation(
            "Shop name and location are required".to_string(),
        ));
    }
    Ok((name, location))
}

pub async fn delete_shop<S: Store>(store: &S, user_id: Uuid, shop_id: Uuid) -> Result<()> {
    if !store.delete_shop(user_id, shop_id).await? {
        return Err(Error::NotFound("Shop not found".to_string()));
    }
    info!("Deleted shop {}", shop_id);
    Ok(())
}

pub async fn list_shops<S: Store>(store: &S, user_id: Uuid) -> Result<Vec<Shop>> {
    store.list_shops(user_id).await
}

async fn owned_shop<S: Store>(store: &S, user_id: Uuid, shop_id: Uuid) -> Result<Shop> {
    store
        .find_shop(shop_id)
        .await?
        .filter(|shop| shop.user_id == user_id)
        .ok_or_else(|| Error::NotFound("Shop not found".to_string()))
}

pub async fn register_device<S: Store>(
    store: &S,
    user_id: Uuid,
    device_name: &str,
    device_uid: &str,
    shop_id: Option<Uuid>,
) -> Result<Device> {
    let (device_name, device_uid) = device_fields(device_name, device_uid)?;
    if let Some(shop_id) = shop_id {
        owned_shop(store, user_id, shop_id).await?;
    }

    let device = store
        .insert_device(
            NewDevice {
                user_id,
                device_uid: device_uid.to_string(),
                device_name: device_name.to_string(),
                shop_id,
            },
            Utc::now(),
        )
        .await?;
    info!("Registered device {} ({})", device.device_uid, device.id);
    Ok(device)
}

/// Rewrites the device's name, uid and link in one step.
pub async fn update_device<S: Store>(
    store: &S,
    user_id: Uuid,
    device_id: Uuid,
    device_name: &str,
    device_uid: &str,
    shop_id: Option<Uuid>,
) -> Result<Device> {
    let (device_name, device_uid) = device_fields(device_name, device_uid)?;
    if let Some(shop_id) = shop_id {
        owned_shop(store, user_id, shop_id).await?;
    }

    let device = store
        .update_device(user_id, device_id, device_name, device_uid, shop_id)
        .await?
        .ok_or_else(|| Error::NotFound("Device not found".to_string()))?;
    info!("Updated device {} ({})", device.device_uid, device.id);
    Ok(device)
}

fn device_fields<'a>(device_name: &'a str, device_uid: &'a str) -> Result<(&'a str, &'a str)> {
    let (device_name, device_uid) = (device_name.trim(), device_uid.trim());
    if device_name.is_empty() || device_uid.is_empty() {
        return Err(Error::Validation(
            "Device name and ID are required".to_string(),
        ));
    }
    Ok((device_name, device_uid))
}

/// Links the device to `shop_id`, or unlinks it when `None`.
pub async fn link_device<S: Store>(
    store: &S,
    user_id: Uuid,
    device_id: Uuid,
    shop_id: Option<Uuid>,
) -> Result<Device> {
    if let Some(shop_id) = shop_id {
        owned_shop(store, user_id, shop_id).await?;
    }

    store
        .set_device_shop(user_id, device_id, shop_id)
        .await?
        .ok_or_else(|| Error::NotFound("Device not found".to_string()))
}

pub async fn delete_device<S: Store>(store: &S, user_id: Uuid, device_id: Uuid) -> Result<()> {
    if !store.delete_device(user_id, device_id).await? {
        return Err(Error::NotFound("Device not found".to_string()));
    }
    info!("Deleted device {}", device_id);
    Ok(())
}

pub async fn list_devices<S: Store>(store: &S, user_id: Uuid) -> Result<Vec<Device>> {
    store.list_devices(user_id).await
}

pub async fn search_public_shops<S: Store>(
    store: &S,
    query: &str,
    limit: Option<usize>,
) -> Result<Vec<Shop>> {
    let limit = limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    store.search_public_shops(query.trim(), limit).await
}

/// Shop and device totals for one owner as of `now`.
pub async fn owner_summary<S: Store>(
    store: &S,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<DashboardSummary> {
    let shops = store.list_shops(user_id).await?;
    let devices = store.list_devices(user_id).await?;

    let online_devices = devices
        .iter()
        .filter(|d| is_online(d.last_seen, now))
        .count();
    let avg_crowd_count = average_count(&shops);

    // Ties keep the first shop in listing order
    let top_shop = shops
        .iter()
        .fold(None::<&Shop>, |top, shop| match top {
            Some(best) if best.crowd_count >= shop.crowd_count => Some(best),
            _ => Some(shop),
        })
        .cloned()
        .map(ShopSnapshot::from);

    Ok(DashboardSummary {
        shop_count: shops.len(),
        device_count: devices.len(),
        online_devices,
        avg_crowd_count,
        avg_crowd_status: classify_crowd(avg_crowd_count),
        top_shop,
    })
}

fn average_count(shops: &[Shop]) -> i32 {
    if shops.is_empty() {
        return 0;
    }
    let total: i64 = shops.iter().map(|s| i64::from(s.crowd_count)).sum();
    (total as f64 / shops.len() as f64).round() as i32
}
