use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A telemetry event as persisted by the local sink. The payload keeps the
/// wire shape so it can be replayed to a remote backend later.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    pub row_id: i64,
    pub session_id: String,
    pub event_id: String,
    pub kind: String,
    pub payload: Value,
    pub ts: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}
