use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the `harvests` mirror table, without the payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MirrorEntry {
    pub league: String,
    /// Slot name, e.g. `teams` or `scoreboard_20241019`
    pub data_type: String,
    pub harvested_at: DateTime<Utc>,
    /// Size of the stored JSON payload in bytes
    pub payload_bytes: i64,
}
