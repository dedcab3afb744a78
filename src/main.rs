//! DeltaStream service entrypoint: wires the cache/store/broker backends,
//! spawns the ingest subscriber, enrichment worker pool, and fan-out
//! broadcaster, then serves the query API and websocket gateway behind one
//! axum router. Shaped after the teacher's `main.rs` (`AppState`, router
//! assembly, `tokio::main`), generalized from a single-process arbitrage bot
//! into this pipeline's ingest/enrich/fan-out topology.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deltastream::api::routes;
use deltastream::broker::RedisTaskQueue;
use deltastream::cache::RedisCacheStore;
use deltastream::gateway::{self, GatewayState};
use deltastream::ingest::IngestSubscriber;
use deltastream::middleware::request_logging;
use deltastream::store::{DocumentStore, SqliteStore};
use deltastream::worker::{EnrichmentRunner, OhlcGuard, TaskRunner, WorkerPool};
use deltastream::{AppState, Config};

/// Unrecoverable startup failure per the operational exit-code convention.
const EXIT_STARTUP_FAILURE: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "startup failed");
            ExitCode::from(EXIT_STARTUP_FAILURE)
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(redis_url = %config.redis_url, sqlite_path = %config.sqlite_path, "starting deltastream");

    let cache = Arc::new(RedisCacheStore::connect(&config.redis_url).await?);
    let queue = Arc::new(RedisTaskQueue::connect(&config.redis_url).await?);
    let store = Arc::new(SqliteStore::open(&config.sqlite_path)?);
    store.ensure_schema().await?;

    let ohlc_guard = Arc::new(OhlcGuard::new());
    let runner: Arc<dyn TaskRunner> =
        Arc::new(EnrichmentRunner::new(cache.clone(), store.clone(), ohlc_guard));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ingest = Arc::new(IngestSubscriber::new(
        cache.clone(),
        queue.clone(),
        config.broker_high_watermark,
        config.broker_low_watermark,
    ));
    let ingest_handle = tokio::spawn(ingest.run());

    let pool = Arc::new(WorkerPool::new(queue.clone(), runner, cache.clone(), config.clone()));
    let mut worker_handles = pool.spawn(shutdown_rx.clone());

    let gateway_state = GatewayState::new(cache.clone(), store.clone(), config.clone());
    let broadcaster_handle = gateway_state.spawn_broadcaster();

    let app_state = Arc::new(AppState { store: store.clone(), cache: cache.clone() });

    let api_router = Router::new()
        .route("/health", get(routes::health))
        .route("/underlying/:product", get(routes::get_underlying))
        .route("/option/chain/:product", get(routes::get_option_chain))
        .route("/option/expiries/:product", get(routes::get_option_expiries))
        .route("/products", get(routes::get_products))
        .with_state(app_state);

    let ws_router = Router::new()
        .route("/ws", get(gateway::upgrade))
        .with_state(gateway_state);

    let app = Router::new().merge(api_router).merge(ws_router).layer(from_fn(request_logging));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.gateway_port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "gateway listening");

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>());
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!(error = %e, "server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, draining workers");
        }
    }

    let _ = shutdown_tx.send(true);
    ingest_handle.abort();
    broadcaster_handle.abort();
    for handle in worker_handles.drain(..) {
        let _ = handle.await;
    }

    info!("shutdown complete");
    Ok(())
}
