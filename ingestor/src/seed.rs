//! Development fixtures for the memory backend.
//!
//! ```json
//! { "users": [{
//!     "id": "7f1c2a6e-0000-4000-8000-000000000001",
//!     "api_key": "dev-key",
//!     "shops": [{ "name": "Bakery", "location": "Main St", "devices": [
//!         { "device_uid": "esp-door", "device_name": "Front door" }
//!     ]}],
//!     "devices": [{ "device_uid": "esp-spare", "device_name": "Spare" }]
//! }]}
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::Result;
use crate::registry;
use crate::store::Store;

#[derive(Debug, Deserialize)]
pub struct Seed {
    pub users: Vec<SeedUser>,
}

#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub id: Uuid,
    pub api_key: String,
    #[serde(default)]
    pub shops: Vec<SeedShop>,
    /// Devices without a shop.
    #[serde(default)]
    pub devices: Vec<SeedDevice>,
}

#[derive(Debug, Deserialize)]
pub struct SeedShop {
    pub name: String,
    pub location: String,
    #[serde(default = "default_public")]
    pub is_public: bool,
    #[serde(default)]
    pub devices: Vec<SeedDevice>,
}

#[derive(Debug, Deserialize)]
pub struct SeedDevice {
    pub device_uid: String,
    pub device_name: String,
}

fn default_public() -> bool {
    true
}

pub fn load_seed(path: &Path) -> Result<Seed> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub async fn apply_seed<S: Store>(store: &S, seed: Seed) -> Result<()> {
    for user in seed.users {
        store.set_api_key(user.id, &user.api_key).await?;

        for shop in user.shops {
            let created =
                registry::create_shop(store, user.id, &shop.name, &shop.location, shop.is_public)
                    .await?;
            for device in shop.devices {
                registry::register_device(
                    store,
                    user.id,
                    &device.device_name,
                    &device.device_uid,
                    Some(created.id),
                )
                .await?;
            }
        }

        for device in user.devices {
            registry::register_device(
                store,
                user.id,
                &device.device_name,
                &device.device_uid,
                None,
            )
            .await?;
        }
        info!("Seeded user {}", user.id);
    }
    Ok(())
}
