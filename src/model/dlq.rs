use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only dead-letter entry (spec §3/§4.C).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub task_kind: String,
    pub task_id: String,
    pub error: String,
    pub args: serde_json::Value,
    pub failed_at: DateTime<Utc>,
}
