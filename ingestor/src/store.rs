use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::Result;
use crate::model::{Device, NewDevice, NewShop, Shop};

pub trait Store: Clone + Send + Sync + 'static {
    /// Owner of the credential matching `api_key` exactly.
    fn find_user_by_api_key(
        &self,
        api_key: &str,
    ) -> impl Future<Output = Result<Option<Uuid>>> + Send;

    fn api_key_for(&self, user_id: Uuid) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Replaces the user's credential, creating it if absent.
    fn set_api_key(
        &self,
        user_id: Uuid,
        api_key: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Device with `device_uid` owned by `user_id`.
    fn find_device(
        &self,
        user_id: Uuid,
        device_uid: &str,
    ) -> impl Future<Output = Result<Option<Device>>> + Send;

    /// Advances `last_seen` to `seen_at`, never moving it backward.
    fn touch_device(
        &self,
        device_id: Uuid,
        seen_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Overwrites the shop's crowd count.
    fn set_crowd_count(
        &self,
        shop_id: Uuid,
        count: i32,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn find_shop(&self, shop_id: Uuid) -> impl Future<Output = Result<Option<Shop>>> + Send;

    fn insert_shop(
        &self,
        shop: NewShop,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Shop>> + Send;

    /// Renames or relocates an owned shop. `None` if absent.
    fn update_shop(
        &self,
        user_id: Uuid,
        shop_id: Uuid,
        name: &str,
        location: &str,
    ) -> impl Future<Output = Result<Option<Shop>>> + Send;

    /// Deletes an owned shop and unlinks its devices. Returns false if absent.
    fn delete_shop(&self, user_id: Uuid, shop_id: Uuid)
        -> impl Future<Output = Result<bool>> + Send;

    fn list_shops(&self, user_id: Uuid) -> impl Future<Output = Result<Vec<Shop>>> + Send;

    /// Fails with `Conflict` when `device_uid` is already registered.
    fn insert_device(
        &self,
        device: NewDevice,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Device>> + Send;

    /// Sets or clears the shop link of an owned device.
    fn set_device_shop(
        &self,
        user_id: Uuid,
        device_id: Uuid,
        shop_id: Option<Uuid>,
    ) -> impl Future<Output = Result<Option<Device>>> + Send;

    /// Rewrites name, uid and link of an owned device. Fails with `Conflict`
    /// when the new uid belongs to another device.
    fn update_device(
        &self,
        user_id: Uuid,
        device_id: Uuid,
        device_name: &str,
        device_uid: &str,
        shop_id: Option<Uuid>,
    ) -> impl Future<Output = Result<Option<Device>>> + Send;

    fn delete_device(
        &self,
        user_id: Uuid,
        device_id: Uuid,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn list_devices(&self, user_id: Uuid) -> impl Future<Output = Result<Vec<Device>>> + Send;

    /// Public shops whose name or location contains `query`, busiest first.
    fn search_public_shops(
        &self,
        query: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Shop>>> + Send;
}
