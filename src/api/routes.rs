//! §4.G/§6 read-only query API: the five endpoints over `DocumentStore`, plus
//! a `/health` probe of the cache/bus backend (teacher's `health_check`
//! pattern, generalized from a constant string to an actual reachability
//! check per §7's TransientBackend → HTTP 5xx policy).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{EnrichedChain, Product, UnderlyingTick};
use crate::AppState;

const DEFAULT_TICK_LIMIT: usize = 100;
const DEFAULT_CHAIN_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct TickQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ChainQuery {
    pub expiry: Option<NaiveDate>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UnderlyingResponse {
    pub product: Product,
    pub count: usize,
    pub ticks: Vec<UnderlyingTick>,
}

#[derive(Debug, Serialize)]
pub struct OptionChainResponse {
    pub product: Product,
    pub count: usize,
    pub chains: Vec<EnrichedChain>,
}

#[derive(Debug, Serialize)]
pub struct ProductsResponse {
    pub products: Vec<Product>,
}

#[derive(Debug, Serialize)]
pub struct ExpiriesResponse {
    pub product: Product,
    pub expiries: Vec<NaiveDate>,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, StatusCode> {
    state.store.ping().await.map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    state
        .cache
        .get("health:probe")
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(HealthResponse { status: "healthy" }))
}

pub async fn get_underlying(
    Path(product): Path<Product>,
    Query(params): Query<TickQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<UnderlyingResponse>, StatusCode> {
    let ticks = state
        .store
        .query_ticks(&product, params.start, params.end, params.limit.unwrap_or(DEFAULT_TICK_LIMIT))
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(UnderlyingResponse {
        product,
        count: ticks.len(),
        ticks,
    }))
}

pub async fn get_option_chain(
    Path(product): Path<Product>,
    Query(params): Query<ChainQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<OptionChainResponse>, StatusCode> {
    let chains = state
        .store
        .query_chains(&product, params.expiry, params.limit.unwrap_or(DEFAULT_CHAIN_LIMIT))
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(OptionChainResponse {
        product,
        count: chains.len(),
        chains,
    }))
}

pub async fn get_products(State(state): State<Arc<AppState>>) -> Result<Json<ProductsResponse>, StatusCode> {
    let products = state.store.list_products().await.map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(ProductsResponse { products }))
}

pub async fn get_option_expiries(
    Path(product): Path<Product>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ExpiriesResponse>, StatusCode> {
    let expiries = state.store.list_expiries(&product).await.map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(ExpiriesResponse { product, expiries }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;
    use crate::store::{DocumentStore, SqliteStore};

    async fn state() -> Arc<AppState> {
        let cache = Arc::new(InMemoryCacheStore::new());
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let path_str = path.to_str().unwrap().to_string();
        std::mem::forget(path);
        let store = Arc::new(SqliteStore::open(&path_str).unwrap());
        store.ensure_schema().await.unwrap();
        Arc::new(AppState { store, cache })
    }

    #[tokio::test]
    async fn health_reports_healthy_when_backends_reachable() {
        let state = state().await;
        let resp = health(State(state)).await.unwrap();
        assert_eq!(resp.0.status, "healthy");
    }

    #[tokio::test]
    async fn products_and_expiries_are_empty_on_a_fresh_store() {
        let state = state().await;
        let products = get_products(State(state.clone())).await.unwrap();
        assert!(products.0.products.is_empty());

        let expiries = get_option_expiries(Path("NIFTY".to_string()), State(state)).await.unwrap();
        assert_eq!(expiries.0.product, "NIFTY");
        assert!(expiries.0.expiries.is_empty());
    }

    #[tokio::test]
    async fn underlying_and_chain_responses_are_wrapped_with_product_and_count() {
        let state = state().await;
        state
            .store
            .insert_tick(&crate::model::UnderlyingTick {
                product: "NIFTY".to_string(),
                tick_id: 1,
                price: rust_decimal_macros::dec!(21500),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();

        let resp = get_underlying(
            Path("NIFTY".to_string()),
            Query(TickQuery { start: None, end: None, limit: None }),
            State(state),
        )
        .await
        .unwrap();
        assert_eq!(resp.0.product, "NIFTY");
        assert_eq!(resp.0.count, 1);
        assert_eq!(resp.0.ticks.len(), 1);
    }

    #[tokio::test]
    async fn option_chain_endpoint_defaults_limit_to_ten() {
        let state = state().await;
        let resp = get_option_chain(
            Path("NIFTY".to_string()),
            Query(ChainQuery { expiry: None, limit: None }),
            State(state),
        )
        .await
        .unwrap();
        assert_eq!(resp.0.product, "NIFTY");
        assert_eq!(resp.0.count, 0);
    }
}
