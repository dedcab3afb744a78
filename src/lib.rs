//! DeltaStream — real-time options-market analytics ingest/enrichment/
//! fan-out pipeline. Library crate so the binary and integration tests share
//! one module tree.

pub mod analytics;
pub mod api;
pub mod broker;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ingest;
pub mod middleware;
pub mod model;
pub mod store;
pub mod worker;

pub use config::Config;
pub use error::{PipelineError, Result};

use std::sync::Arc;

use cache::CacheStore;
use store::DocumentStore;

/// Shared state for the read-only query API (§4.G/§6). The fan-out gateway
/// and worker pool carry their own state structs — this one is scoped to the
/// HTTP surface in `src/api/routes.rs`.
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub cache: Arc<dyn CacheStore>,
}
