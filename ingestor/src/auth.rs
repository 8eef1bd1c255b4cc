use rand::RngCore;
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::model::Device;
use crate::store::Store;

const API_KEY_BYTES: usize = 32;

/// Resolves the user owning `api_key`.
pub async fn authenticate<S: Store>(store: &S, api_key: &str) -> Result<Uuid> {
    if api_key.is_empty() {
        return Err(Error::Unauthorized("Invalid API key".to_string()));
    }

    store
        .find_user_by_api_key(api_key)
        .await?
        .ok_or_else(|| Error::Unauthorized("Invalid API key".to_string()))
}

/// Finds the device `device_uid` among the user's devices. Another owner's
/// device reads as not found.
pub async fn resolve_device<S: Store>(
    store: &S,
    user_id: Uuid,
    device_uid: &str,
) -> Result<Device> {
    store
        .find_device(user_id, device_uid)
        .await?
        .ok_or_else(|| {
            Error::NotFound("Device not found or not associated with this API key".to_string())
        })
}

/// 32 random bytes, hex encoded.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::model::NewDevice;
    use crate::store::Store;
    use chrono::Utc;

    #[test]
    fn test_generated_key_shape() {
        let key = generate_api_key();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(key, generate_api_key());
    }

    #[tokio::test]
    async fn test_authenticate() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.set_api_key(user, "secret").await.unwrap();

        assert_eq!(authenticate(&store, "secret").await.unwrap(), user);
        assert!(matches!(
            authenticate(&store, "wrong").await,
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            authenticate(&store, "").await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_key_match_is_exact() {
        let store = MemoryStore::new();
        store.set_api_key(Uuid::new_v4(), "secret").await.unwrap();

        assert!(authenticate(&store, "SECRET").await.is_err());
        assert!(authenticate(&store, "secret ").await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_device_is_tenant_scoped() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        store
            .insert_device(
                NewDevice {
                    user_id: owner,
                    device_uid: "esp-1".to_string(),
                    device_name: "Door".to_string(),
                    shop_id: None,
                },
                Utc::now(),
            )
            .await
            .unwrap();

        assert!(resolve_device(&store, owner, "esp-1").await.is_ok());
        assert!(matches!(
            resolve_device(&store, other, "esp-1").await,
            Err(Error::NotFound(_))
        ));
    }
}
