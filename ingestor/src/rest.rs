use crate::classify::classify_crowd;
use crate::errors::Error;
use crate::metrics::{
    gather_metrics, record_rejection, READINGS_TOTAL, REQUEST_LATENCY_SECONDS,
    SHOP_UPDATES_TOTAL, STATUS_QUERIES_TOTAL, UNLINKED_READINGS_TOTAL,
};
use crate::model::{PublicShop, SearchResponse, StatusResponse, UpdateResponse};
use crate::registry::search_public_shops;
use crate::service::{device_status, ingest};
use crate::store::Store;
use crate::validate::{parse_reading, require_params};
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Request headers browsers and device SDKs may send.
const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type, \
x-supabase-client-platform, x-supabase-client-platform-version, \
x-supabase-client-runtime, x-supabase-client-runtime-version";

#[derive(Debug, Clone)]
struct AppState<S> {
    store: S,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
    limit: Option<usize>,
}

pub fn create_router<S: Store>(store: S) -> Router {
    let state = AppState { store };

    Router::new()
        .route(
            "/esp32-update",
            post(update_reading::<S>).fallback(method_not_allowed),
        )
        .route(
            "/esp32-status",
            get(get_status::<S>).fallback(method_not_allowed),
        )
        .route("/api/v1/shops/search", get(search_shops::<S>))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health))
        .layer(cors_layer())
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(
            ALLOWED_HEADERS
                .split(", ")
                .map(HeaderName::from_static)
                .collect::<Vec<_>>(),
        )
}

async fn update_reading<S: Store>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Result<Json<UpdateResponse>, Error> {
    let timer = REQUEST_LATENCY_SECONDS
        .with_label_values(&["update"])
        .start_timer();

    let result = async {
        let reading = parse_reading(&body)?;
        ingest(&state.store, reading, Utc::now()).await
    }
    .await;
    timer.observe_duration();

    match result {
        Ok(response) => {
            READINGS_TOTAL.inc();
            if response.shop_id.is_some() {
                SHOP_UPDATES_TOTAL.inc();
            } else {
                UNLINKED_READINGS_TOTAL.inc();
            }
            Ok(Json(response))
        }
        Err(e) => {
            if e.status().is_client_error() {
                warn!("Rejected device update: {}", e);
            }
            record_rejection("update", &e);
            Err(e)
        }
    }
}

async fn get_status<S: Store>(
    State(state): State<AppState<S>>,
    params: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<StatusResponse>, Error> {
    let timer = REQUEST_LATENCY_SECONDS
        .with_label_values(&["status"])
        .start_timer();

    let result = async {
        let Query(pairs) = params.map_err(|e| Error::Validation(e.body_text()))?;
        // Repeated keys resolve to their first value
        let first = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        let (device_id, api_key) = require_params(first("device_id"), first("api_key"))?;
        device_status(&state.store, device_id, api_key, Utc::now()).await
    }
    .await;
    timer.observe_duration();

    match result {
        Ok(response) => {
            STATUS_QUERIES_TOTAL.inc();
            Ok(Json(response))
        }
        Err(e) => {
            if e.status().is_client_error() {
                warn!("Rejected status query: {}", e);
            }
            record_rejection("status", &e);
            Err(e)
        }
    }
}

async fn search_shops<S: Store>(
    State(state): State<AppState<S>>,
    params: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<SearchResponse>, Error> {
    let Query(params) = params.map_err(|e| {
        let err = Error::Validation(e.body_text());
        record_rejection("search", &err);
        err
    })?;
    let query = params.q.unwrap_or_default();
    let shops = search_public_shops(&state.store, &query, params.limit).await?;

    let data: Vec<PublicShop> = shops
        .into_iter()
        .map(|shop| PublicShop {
            crowd_status: classify_crowd(shop.crowd_count),
            id: shop.id,
            name: shop.name,
            location: shop.location,
            crowd_count: shop.crowd_count,
            updated_at: shop.updated_at,
        })
        .collect();

    Ok(Json(SearchResponse {
        total: data.len(),
        data,
    }))
}

async fn method_not_allowed() -> Error {
    Error::MethodNotAllowed
}

async fn metrics_handler() -> Result<String, Error> {
    gather_metrics()
}

async fn health() -> &'static str {
    "ok"
}
