//! Error kinds for the enrichment/fan-out pipeline.
//!
//! These map 1:1 onto spec §7. They exist so retry/DLQ logic can match on a
//! kind instead of string-sniffing an `anyhow::Error`. Call sites that only
//! need short-lived context (I/O, parsing) still reach for `anyhow`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed JSON, missing field, schema violation. No retry — straight to DLQ.
    #[error("envelope invalid: {0}")]
    EnvelopeInvalid(String),

    /// Data fails a §3 invariant (e.g. |calls| != |strikes|). No retry — DLQ.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Cache/store/bus unavailable, timeout, connection refused. Retried with backoff.
    #[error("transient backend failure: {0}")]
    TransientBackend(String),

    /// Unique-index violation on insert. Treated as idempotent success by callers.
    #[error("duplicate effect: {0}")]
    DuplicateEffect(String),

    /// Soft or hard per-task time limit exceeded.
    #[error("task timeout: {0}")]
    TaskTimeout(String),

    /// Session outbound queue exceeded sustained overflow.
    #[error("subscriber overflow: {0}")]
    SubscriberOverflow(String),

    /// Broker queue depth crossed the high watermark.
    #[error("backpressure triggered: depth={depth} watermark={watermark}")]
    BackpressureTrigger { depth: usize, watermark: usize },
}

impl PipelineError {
    /// Per §7/§4.C: transient failures retry, everything else goes straight to DLQ.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::TransientBackend(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
