use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed client exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub client_id: u64,
    pub method: String,
    pub target: String,
    /// The origin endpoint as `host:port`
    pub origin: String,
    /// `relayed`, `tunnel`, a synthesised status code, or `abandoned`
    pub outcome: String,
    pub duration_ms: i64,
}
