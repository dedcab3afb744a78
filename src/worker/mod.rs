//! §4.C/§5 enrichment worker pool: task execution, retry/backoff policy, and
//! the per-(product, window) OHLC serialization guard.

mod ohlc_guard;
mod pool;
mod retry;
mod runner;

pub use ohlc_guard::OhlcGuard;
pub use pool::WorkerPool;
pub use retry::{backoff_delay, decide, RetryDecision};
pub use runner::{EnrichmentRunner, TaskRunner};
