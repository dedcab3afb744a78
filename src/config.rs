//! Runtime configuration, env-driven.
//!
//! Mirrors the teacher's `Config::from_env` shape: `dotenv` loads a local
//! `.env` if present, every field falls back to a documented default, and
//! parse failures fall back rather than panic (this is a long-running service,
//! not a one-shot CLI that should fail loudly on a typo'd env var — operators
//! get a sane default and can fix the env var on the next restart).

use std::env;
use std::time::Duration;

/// §6 required configuration plus the resource budgets §5 recommends as defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache/bus/broker endpoint (Redis connection URL).
    pub redis_url: String,
    /// Document store path (SQLite file).
    pub sqlite_path: String,
    /// Fan-out gateway listen port.
    pub gateway_port: u16,
    /// Enrichment worker pool size.
    pub worker_count: usize,
    /// Accepted but unused by the pipeline — consumed only by the feed generator.
    pub feed_interval_secs: u64,

    /// Broker queue high watermark (Hm) — ingest pauses above this.
    pub broker_high_watermark: usize,
    /// Broker queue low watermark (Lm) — ingest resumes below this.
    pub broker_low_watermark: usize,
    /// Per-session outbound queue capacity (Q).
    pub session_queue_capacity: usize,
    /// Task retry base delay.
    pub retry_base: Duration,
    /// Max retry attempts before DLQ.
    pub retry_max_attempts: u32,
    /// Soft per-task time limit.
    pub task_soft_timeout: Duration,
    /// Hard per-task time limit.
    pub task_hard_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            sqlite_path: "./deltastream.db".to_string(),
            gateway_port: 8080,
            worker_count: 4,
            feed_interval_secs: 1,
            broker_high_watermark: 5_000,
            broker_low_watermark: 1_000,
            session_queue_capacity: 256,
            retry_base: Duration::from_secs(5),
            retry_max_attempts: 3,
            task_soft_timeout: Duration::from_secs(60),
            task_hard_timeout: Duration::from_secs(90),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let default = Self::default();

        Self {
            redis_url: env::var("REDIS_URL").unwrap_or(default.redis_url),
            sqlite_path: env::var("SQLITE_PATH").unwrap_or(default.sqlite_path),
            gateway_port: env::var("GATEWAY_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.gateway_port),
            worker_count: env::var("WORKER_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&v: &usize| v > 0)
                .unwrap_or(default.worker_count),
            feed_interval_secs: env::var("FEED_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.feed_interval_secs),
            broker_high_watermark: env::var("BROKER_HIGH_WATERMARK")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.broker_high_watermark),
            broker_low_watermark: env::var("BROKER_LOW_WATERMARK")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.broker_low_watermark),
            session_queue_capacity: env::var("SESSION_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.session_queue_capacity),
            retry_base: default.retry_base,
            retry_max_attempts: default.retry_max_attempts,
            task_soft_timeout: default.task_soft_timeout,
            task_hard_timeout: default.task_hard_timeout,
        }
    }
}
