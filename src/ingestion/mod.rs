//! The session/event ingestion collaborator.
//!
//! Telemetry goes through `send_events` with at-least-once semantics: callers
//! may redeliver a batch after a failure they could not distinguish from a
//! lost ack, so sinks should key on `TelemetryEvent::id`. Alerts are
//! best-effort and never retried by this crate.

mod http;
mod local;

pub use http::HttpIngestion;
pub use local::LocalIngestion;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{AlertReason, ClientMeta, TelemetryEvent};

#[async_trait]
pub trait IngestionClient: Send + Sync {
    /// Returns the new session id.
    async fn start_session(&self, lesson_id: &str, meta: &ClientMeta) -> Result<String>;

    async fn send_events(&self, session_id: &str, events: &[TelemetryEvent]) -> Result<()>;

    async fn end_session(&self, session_id: &str) -> Result<()>;

    async fn raise_attention_alert(&self, session_id: &str, reason: AlertReason) -> Result<()>;
}
