use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::model::{Device, NewDevice, NewShop, Shop};
use crate::store::Store;

#[derive(Debug, Default)]
struct Tables {
    api_keys: HashMap<Uuid, String>,
    shops: HashMap<Uuid, Shop>,
    devices: HashMap<Uuid, Device>,
}

/// Thread-safe in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|e| Error::Internal(format!("Lock error: {}", e)))
    }
}

impl Store for MemoryStore {
    async fn find_user_by_api_key(&self, api_key: &str) -> Result<Option<Uuid>> {
        let tables = self.tables()?;
        Ok(tables
            .api_keys
            .iter()
            .find(|(_, key)| key.as_str() == api_key)
            .map(|(user_id, _)| *user_id))
    }

    async fn api_key_for(&self, user_id: Uuid) -> Result<Option<String>> {
        Ok(self.tables()?.api_keys.get(&user_id).cloned())
    }

    async fn set_api_key(&self, user_id: Uuid, api_key: &str) -> Result<()> {
        let mut tables = self.tables()?;
        let taken = tables
            .api_keys
            .iter()
            .any(|(owner, key)| *owner != user_id && key.as_str() == api_key);
        if taken {
            return Err(Error::Conflict(
                "API key collision, regenerate again".to_string(),
            ));
        }
        tables.api_keys.insert(user_id, api_key.to_string());
        Ok(())
    }

    async fn find_device(&self, user_id: Uuid, device_uid: &str) -> Result<Option<Device>> {
        let tables = self.tables()?;
        Ok(tables
            .devices
            .values()
            .find(|d| d.user_id == user_id && d.device_uid == device_uid)
            .cloned())
    }

    async fn touch_device(&self, device_id: Uuid, seen_at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables()?;
        if let Some(device) = tables.devices.get_mut(&device_id) {
            device.last_seen = Some(device.last_seen.map_or(seen_at, |prev| prev.max(seen_at)));
        }
        Ok(())
    }

    async fn set_crowd_count(&self, shop_id: Uuid, count: i32, at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables()?;
        if let Some(shop) = tables.shops.get_mut(&shop_id) {
            shop.crowd_count = count;
            shop.updated_at = at;
        }
        Ok(())
    }

    async fn find_shop(&self, shop_id: Uuid) -> Result<Option<Shop>> {
        Ok(self.tables()?.shops.get(&shop_id).cloned())
    }

    async fn insert_shop(&self, shop: NewShop, now: DateTime<Utc>) -> Result<Shop> {
        let shop = Shop {
            id: Uuid::new_v4(),
            user_id: shop.user_id,
            name: shop.name,
            location: shop.location,
            crowd_count: 0,
            is_public: shop.is_public,
            updated_at: now,
        };
        self.tables()?.shops.insert(shop.id, shop.clone());
        Ok(shop)
    }

    async fn update_shop(
        &self,
        user_id: Uuid,
        shop_id: Uuid,
        name: &str,
        location: &str,
    ) -> Result<Option<Shop>> {
        let mut tables = self.tables()?;
        Ok(tables
            .shops
            .get_mut(&shop_id)
            .filter(|s| s.user_id == user_id)
            .map(|s| {
                s.name = name.to_string();
                s.location = location.to_string();
                s.clone()
            }))
    }

    async fn delete_shop(&self, user_id: Uuid, shop_id: Uuid) -> Result<bool> {
        let mut tables = self.tables()?;
        let owned = tables
            .shops
            .get(&shop_id)
            .is_some_and(|shop| shop.user_id == user_id);
        if !owned {
            return Ok(false);
        }

        tables.shops.remove(&shop_id);
        for device in tables.devices.values_mut() {
            if device.shop_id == Some(shop_id) {
                device.shop_id = None;
            }
        }
        Ok(true)
    }

    async fn list_shops(&self, user_id: Uuid) -> Result<Vec<Shop>> {
        let tables = self.tables()?;
        let mut shops: Vec<Shop> = tables
            .shops
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        shops.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(shops)
    }

    async fn insert_device(&self, device: NewDevice, now: DateTime<Utc>) -> Result<Device> {
        let mut tables = self.tables()?;
        if tables
            .devices
            .values()
            .any(|d| d.device_uid == device.device_uid)
        {
            return Err(Error::Conflict("Device ID already in use".to_string()));
        }

        let device = Device {
            id: Uuid::new_v4(),
            user_id: device.user_id,
            device_uid: device.device_uid,
            device_name: device.device_name,
            shop_id: device.shop_id,
            last_seen: None,
            created_at: now,
        };
        tables.devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn set_device_shop(
        &self,
        user_id: Uuid,
        device_id: Uuid,
        shop_id: Option<Uuid>,
    ) -> Result<Option<Device>> {
        let mut tables = self.tables()?;
        Ok(tables
            .devices
            .get_mut(&device_id)
            .filter(|d| d.user_id == user_id)
            .map(|d| {
                d.shop_id = shop_id;
                d.clone()
            }))
    }

    async fn update_device(
        &self,
        user_id: Uuid,
        device_id: Uuid,
        device_name: &str,
        device_uid: &str,
        shop_id: Option<Uuid>,
    ) -> Result<Option<Device>> {
        let mut tables = self.tables()?;
        if tables
            .devices
            .values()
            .any(|d| d.id != device_id && d.device_uid == device_uid)
        {
            return Err(Error::Conflict("Device ID already in use".to_string()));
        }

        Ok(tables
            .devices
            .get_mut(&device_id)
            .filter(|d| d.user_id == user_id)
            .map(|d| {
                d.device_name = device_name.to_string();
                d.device_uid = device_uid.to_string();
                d.shop_id = shop_id;
                d.clone()
            }))
    }

    async fn delete_device(&self, user_id: Uuid, device_id: Uuid) -> Result<bool> {
        let mut tables = self.tables()?;
        let owned = tables
            .devices
            .get(&device_id)
            .is_some_and(|d| d.user_id == user_id);
        if owned {
            tables.devices.remove(&device_id);
        }
        Ok(owned)
    }

    async fn list_devices(&self, user_id: Uuid) -> Result<Vec<Device>> {
        let tables = self.tables()?;
        let mut devices: Vec<Device> = tables
            .devices
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        devices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(devices)
    }

    async fn search_public_shops(&self, query: &str, limit: usize) -> Result<Vec<Shop>> {
        let needle = query.to_lowercase();
        let tables = self.tables()?;
        let mut shops: Vec<Shop> = tables
            .shops
            .values()
            .filter(|s| s.is_public)
            .filter(|s| {
                s.name.to_lowercase().contains(&needle)
                    || s.location.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        shops.sort_by(|a, b| b.crowd_count.cmp(&a.crowd_count));
        shops.truncate(limit);
        Ok(shops)
    }
}
