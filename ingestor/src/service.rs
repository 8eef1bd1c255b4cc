//! Ingestion and status protocol.
//!
//! Replaying an old reading still advances `last_seen` to `now`. A device
//! flushing a cached payload after reconnecting therefore shows as online
//! even though its measurement is stale. The service keeps that behavior.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::auth::{authenticate, resolve_device};
use crate::classify::{classify_crowd, liveness};
use crate::errors::Result;
use crate::model::{Reading, ShopSnapshot, StatusResponse, UpdateResponse};
use crate::store::Store;

pub const UNLINKED_MESSAGE: &str = "Device updated but not linked to any shop";

/// Accepts a validated reading.
pub async fn ingest<S: Store>(
    store: &S,
    reading: Reading,
    now: DateTime<Utc>,
) -> Result<UpdateResponse> {
    let user_id = authenticate(store, &reading.api_key).await?;
    let device = resolve_device(store, user_id, &reading.device_id).await?;

    store.touch_device(device.id, now).await?;

    let Some(shop_id) = device.shop_id else {
        debug!("Device {} reported {} while unlinked", device.device_uid, reading.people_count);
        return Ok(UpdateResponse {
            success: true,
            device_id: reading.device_id,
            people_count: reading.people_count,
            crowd_status: None,
            shop_id: None,
            message: Some(UNLINKED_MESSAGE.to_string()),
            timestamp: now,
        });
    };

    store
        .set_crowd_count(shop_id, reading.people_count, now)
        .await?;

    let crowd_status = classify_crowd(reading.people_count);
    info!(
        "Device {} set shop {} to {} ({})",
        device.device_uid, shop_id, reading.people_count, crowd_status
    );

    Ok(UpdateResponse {
        success: true,
        device_id: reading.device_id,
        people_count: reading.people_count,
        crowd_status: Some(crowd_status),
        shop_id: Some(shop_id),
        message: None,
        timestamp: now,
    })
}

/// Reports liveness and the linked shop. Never writes.
pub async fn device_status<S: Store>(
    store: &S,
    device_uid: &str,
    api_key: &str,
    now: DateTime<Utc>,
) -> Result<StatusResponse> {
    let user_id = authenticate(store, api_key).await?;
    let device = resolve_device(store, user_id, device_uid).await?;

    let shop = match device.shop_id {
        Some(shop_id) => store.find_shop(shop_id).await?.map(ShopSnapshot::from),
        None => None,
    };

    Ok(StatusResponse {
        device_id: device.device_uid,
        device_name: device.device_name,
        status: liveness(device.last_seen, now),
        last_seen: device.last_seen,
        shop,
        timestamp: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{CrowdStatus, Liveness};
    use crate::errors::Error;
    use crate::memory::MemoryStore;
    use crate::model::{NewDevice, NewShop};
    use crate::registry;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    struct Fixture {
        store: MemoryStore,
        user: Uuid,
        api_key: String,
        shop_id: Uuid,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let api_key = registry::regenerate_api_key(&store, user).await.unwrap();
        let shop = store
            .insert_shop(
                NewShop {
                    user_id: user,
                    name: "Corner Shop".to_string(),
                    location: "High Street 1".to_string(),
                    is_public: true,
                },
                t0(),
            )
            .await
            .unwrap();
        for (uid, shop_id) in [("linked", Some(shop.id)), ("loose", None)] {
            store
                .insert_device(
                    NewDevice {
                        user_id: user,
                        device_uid: uid.to_string(),
                        device_name: format!("{} sensor", uid),
                        shop_id,
                    },
                    t0(),
                )
                .await
                .unwrap();
        }
        Fixture {
            store,
            user,
            api_key,
            shop_id: shop.id,
        }
    }

    fn reading(f: &Fixture, device_id: &str, count: i32) -> Reading {
        Reading {
            device_id: device_id.to_string(),
            people_count: count,
            api_key: f.api_key.clone(),
        }
    }

    #[tokio::test]
    async fn test_unlinked_device_only_touches_last_seen() {
        let f = fixture().await;
        let now = t0() + Duration::minutes(1);

        let resp = ingest(&f.store, reading(&f, "loose", 17), now).await.unwrap();

        assert!(resp.success);
        assert_eq!(resp.message.as_deref(), Some(UNLINKED_MESSAGE));
        assert_eq!(resp.crowd_status, None);
        assert_eq!(resp.shop_id, None);

        let device = f.store.find_device(f.user, "loose").await.unwrap().unwrap();
        assert_eq!(device.last_seen, Some(now));
        let shop = f.store.find_shop(f.shop_id).await.unwrap().unwrap();
        assert_eq!(shop.crowd_count, 0);
        assert_eq!(shop.updated_at, t0());
    }

    #[tokio::test]
    async fn test_linked_device_overwrites_count() {
        let f = fixture().await;

        ingest(&f.store, reading(&f, "linked", 20), t0()).await.unwrap();
        let resp = ingest(&f.store, reading(&f, "linked", 4), t0())
            .await
            .unwrap();

        assert_eq!(resp.crowd_status, Some(CrowdStatus::Low));
        assert_eq!(resp.shop_id, Some(f.shop_id));
        assert_eq!(resp.message, None);
        let shop = f.store.find_shop(f.shop_id).await.unwrap().unwrap();
        assert_eq!(shop.crowd_count, 4);
    }

    #[tokio::test]
    async fn test_response_tier_matches_classifier() {
        let f = fixture().await;
        for count in [0, 10, 11, 25, 26, 300] {
            let resp = ingest(&f.store, reading(&f, "linked", count), t0())
                .await
                .unwrap();
            assert_eq!(resp.crowd_status, Some(classify_crowd(count)));

            let status = device_status(&f.store, "linked", &f.api_key, t0())
                .await
                .unwrap();
            assert_eq!(status.shop.unwrap().crowd_status, classify_crowd(count));
        }
    }

    #[tokio::test]
    async fn test_bad_key_is_unauthorized_and_mutates_nothing() {
        let f = fixture().await;
        let mut bad = reading(&f, "linked", 30);
        bad.api_key = "nope".to_string();

        let err = ingest(&f.store, bad, t0()).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        let device = f.store.find_device(f.user, "linked").await.unwrap().unwrap();
        assert_eq!(device.last_seen, None);
    }

    #[tokio::test]
    async fn test_unknown_device_is_not_found() {
        let f = fixture().await;
        let err = ingest(&f.store, reading(&f, "ghost", 1), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_other_users_key_is_not_found() {
        let f = fixture().await;
        let stranger = Uuid::new_v4();
        let stranger_key = registry::regenerate_api_key(&f.store, stranger)
            .await
            .unwrap();

        let mut foreign = reading(&f, "linked", 5);
        foreign.api_key = stranger_key.clone();
        assert!(matches!(
            ingest(&f.store, foreign, t0()).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            device_status(&f.store, "linked", &stranger_key, t0()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_regenerated_key_invalidates_old_one() {
        let f = fixture().await;
        let new_key = registry::regenerate_api_key(&f.store, f.user).await.unwrap();

        assert!(matches!(
            ingest(&f.store, reading(&f, "linked", 5), t0()).await,
            Err(Error::Unauthorized(_))
        ));

        let mut fresh = reading(&f, "linked", 5);
        fresh.api_key = new_key;
        assert!(ingest(&f.store, fresh, t0()).await.is_ok());
    }

    #[tokio::test]
    async fn test_status_liveness_window() {
        let f = fixture().await;
        ingest(&f.store, reading(&f, "linked", 12), t0()).await.unwrap();

        let at = |secs| t0() + Duration::seconds(secs);
        let online = device_status(&f.store, "linked", &f.api_key, at(299))
            .await
            .unwrap();
        assert_eq!(online.status, Liveness::Online);
        assert_eq!(online.last_seen, Some(t0()));

        for secs in [300, 301] {
            let offline = device_status(&f.store, "linked", &f.api_key, at(secs))
                .await
                .unwrap();
            assert_eq!(offline.status, Liveness::Offline);
        }
    }

    #[tokio::test]
    async fn test_status_for_never_seen_unlinked_device() {
        let f = fixture().await;
        let status = device_status(&f.store, "loose", &f.api_key, t0())
            .await
            .unwrap();

        assert_eq!(status.device_name, "loose sensor");
        assert_eq!(status.status, Liveness::Offline);
        assert_eq!(status.last_seen, None);
        assert!(status.shop.is_none());
    }

    #[tokio::test]
    async fn test_status_does_not_mutate() {
        let f = fixture().await;
        device_status(&f.store, "linked", &f.api_key, t0())
            .await
            .unwrap();

        let device = f.store.find_device(f.user, "linked").await.unwrap().unwrap();
        assert_eq!(device.last_seen, None);
    }

    #[tokio::test]
    async fn test_replayed_reading_still_refreshes_liveness() {
        let f = fixture().await;
        ingest(&f.store, reading(&f, "linked", 8), t0()).await.unwrap();

        let later = t0() + Duration::minutes(30);
        ingest(&f.store, reading(&f, "linked", 8), later).await.unwrap();

        let status = device_status(&f.store, "linked", &f.api_key, later)
            .await
            .unwrap();
        assert_eq!(status.status, Liveness::Online);
        assert_eq!(status.last_seen, Some(later));
    }

    #[tokio::test]
    async fn test_concurrent_devices_last_writer_wins() {
        let f = fixture().await;
        f.store
            .insert_device(
                NewDevice {
                    user_id: f.user,
                    device_uid: "second".to_string(),
                    device_name: "Back door".to_string(),
                    shop_id: Some(f.shop_id),
                },
                t0(),
            )
            .await
            .unwrap();

        let first = {
            let store = f.store.clone();
            let r = reading(&f, "linked", 5);
            tokio::spawn(async move { ingest(&store, r, t0()).await })
        };
        let second = {
            let store = f.store.clone();
            let r = reading(&f, "second", 30);
            tokio::spawn(async move { ingest(&store, r, t0()).await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let shop = f.store.find_shop(f.shop_id).await.unwrap().unwrap();
        assert!(shop.crowd_count == 5 || shop.crowd_count == 30);
    }
}
