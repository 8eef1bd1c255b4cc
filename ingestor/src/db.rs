use crate::errors::{Error, Result};
use crate::model::{Device, NewDevice, NewShop, Shop};
use crate::store::Store;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

const DEVICE_COLUMNS: &str =
    "id, user_id, device_uid, device_name, shop_id, last_seen, created_at";
const SHOP_COLUMNS: &str = "id, user_id, name, location, crowd_count, is_public, updated_at";

pub async fn make_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Database connection established");
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

/// Postgres-backed store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        Ok(Self::new(make_pool(database_url, max_connections).await?))
    }
}

impl Store for PgStore {
    async fn find_user_by_api_key(&self, api_key: &str) -> Result<Option<Uuid>> {
        let user_id: Option<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM api_keys WHERE api_key = $1")
                .bind(api_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user_id)
    }

    async fn api_key_for(&self, user_id: Uuid) -> Result<Option<String>> {
        let key: Option<String> =
            sqlx::query_scalar("SELECT api_key FROM api_keys WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(key)
    }

    async fn set_api_key(&self, user_id: Uuid, api_key: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_keys (user_id, api_key, created_at)
            VALUES ($1, $2, now())
            ON CONFLICT (user_id) DO UPDATE
                SET api_key = EXCLUDED.api_key, created_at = EXCLUDED.created_at
            "#,
        )
        .bind(user_id)
        .bind(api_key)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "API key collision, regenerate again"))?;
        Ok(())
    }

    async fn find_device(&self, user_id: Uuid, device_uid: &str) -> Result<Option<Device>> {
        let query = format!(
            "SELECT {} FROM devices WHERE device_uid = $1 AND user_id = $2",
            DEVICE_COLUMNS
        );
        let device = sqlx::query_as::<_, Device>(&query)
            .bind(device_uid)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(device)
    }

    async fn touch_device(&self, device_id: Uuid, seen_at: DateTime<Utc>) -> Result<()> {
        // GREATEST skips NULL, so a first reading simply sets the value.
        sqlx::query("UPDATE devices SET last_seen = GREATEST(last_seen, $2) WHERE id = $1")
            .bind(device_id)
            .bind(seen_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_crowd_count(&self, shop_id: Uuid, count: i32, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE shops SET crowd_count = $2, updated_at = $3 WHERE id = $1")
            .bind(shop_id)
            .bind(count)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_shop(&self, shop_id: Uuid) -> Result<Option<Shop>> {
        let query = format!("SELECT {} FROM shops WHERE id = $1", SHOP_COLUMNS);
        let shop = sqlx::query_as::<_, Shop>(&query)
            .bind(shop_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(shop)
    }

    async fn insert_shop(&self, shop: NewShop, now: DateTime<Utc>) -> Result<Shop> {
        let query = format!(
            "INSERT INTO shops (id, user_id, name, location, crowd_count, is_public, updated_at)
             VALUES ($1, $2, $3, $4, 0, $5, $6)
             RETURNING {}",
            SHOP_COLUMNS
        );
        let shop = sqlx::query_as::<_, Shop>(&query)
            .bind(Uuid::new_v4())
            .bind(shop.user_id)
            .bind(&shop.name)
            .bind(&shop.location)
            .bind(shop.is_public)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Ok(shop)
    }

    async fn update_shop(
        &self,
        user_id: Uuid,
        shop_id: Uuid,
        name: &str,
        location: &str,
    ) -> Result<Option<Shop>> {
        let query = format!(
            "UPDATE shops SET name = $3, location = $4
             WHERE id = $1 AND user_id = $2
             RETURNING {}",
            SHOP_COLUMNS
        );
        let shop = sqlx::query_as::<_, Shop>(&query)
            .bind(shop_id)
            .bind(user_id)
            .bind(name)
            .bind(location)
            .fetch_optional(&self.pool)
            .await?;
        Ok(shop)
    }

    async fn delete_shop(&self, user_id: Uuid, shop_id: Uuid) -> Result<bool> {
        // devices.shop_id is ON DELETE SET NULL
        let result = sqlx::query("DELETE FROM shops WHERE id = $1 AND user_id = $2")
            .bind(shop_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_shops(&self, user_id: Uuid) -> Result<Vec<Shop>> {
        let query = format!(
            "SELECT {} FROM shops WHERE user_id = $1 ORDER BY name",
            SHOP_COLUMNS
        );
        let shops = sqlx::query_as::<_, Shop>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(shops)
    }

    async fn insert_device(&self, device: NewDevice, now: DateTime<Utc>) -> Result<Device> {
        let query = format!(
            "INSERT INTO devices (id, user_id, device_uid, device_name, shop_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            DEVICE_COLUMNS
        );
        let device = sqlx::query_as::<_, Device>(&query)
            .bind(Uuid::new_v4())
            .bind(device.user_id)
            .bind(&device.device_uid)
            .bind(&device.device_name)
            .bind(device.shop_id)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_or(e, "Device ID already in use"))?;
        Ok(device)
    }

    async fn set_device_shop(
        &self,
        user_id: Uuid,
        device_id: Uuid,
        shop_id: Option<Uuid>,
    ) -> Result<Option<Device>> {
        let query = format!(
            "UPDATE devices SET shop_id = $3 WHERE id = $1 AND user_id = $2 RETURNING {}",
            DEVICE_COLUMNS
        );
        let device = sqlx::query_as::<_, Device>(&query)
            .bind(device_id)
            .bind(user_id)
            .bind(shop_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(device)
    }

    async fn update_device(
        &self,
        user_id: Uuid,
        device_id: Uuid,
        device_name: &str,
        device_uid: &str,
        shop_id: Option<Uuid>,
    ) -> Result<Option<Device>> {
        let query = format!(
            "UPDATE devices SET device_name = $3, device_uid = $4, shop_id = $5
             WHERE id = $1 AND user_id = $2
             RETURNING {}",
            DEVICE_COLUMNS
        );
        let device = sqlx::query_as::<_, Device>(&query)
            .bind(device_id)
            .bind(user_id)
            .bind(device_name)
            .bind(device_uid)
            .bind(shop_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| conflict_or(e, "Device ID already in use"))?;
        Ok(device)
    }

    async fn delete_device(&self, user_id: Uuid, device_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM devices WHERE id = $1 AND user_id = $2")
            .bind(device_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_devices(&self, user_id: Uuid) -> Result<Vec<Device>> {
        let query = format!(
            "SELECT {} FROM devices WHERE user_id = $1 ORDER BY created_at DESC",
            DEVICE_COLUMNS
        );
        let devices = sqlx::query_as::<_, Device>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(devices)
    }

    async fn search_public_shops(&self, query: &str, limit: usize) -> Result<Vec<Shop>> {
        let sql = format!(
            "SELECT {}
             FROM shops
             WHERE is_public AND (name ILIKE $1 OR location ILIKE $1)
             ORDER BY crowd_count DESC
             LIMIT $2",
            SHOP_COLUMNS
        );
        let shops = sqlx::query_as::<_, Shop>(&sql)
            .bind(like_pattern(query))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(shops)
    }
}

fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn conflict_or(err: sqlx::Error, message: &str) -> Error {
    if is_unique_violation(&err) {
        Error::Conflict(message.to_string())
    } else {
        Error::Database(err)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("mall"), "%mall%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern(""), "%%");
    }

    #[test]
    fn test_non_database_error_is_not_conflict() {
        assert!(!is_unique_violation(&sqlx::Error::PoolTimedOut));
        assert!(matches!(
            conflict_or(sqlx::Error::PoolTimedOut, "dup"),
            Error::Database(_)
        ));
    }
}
