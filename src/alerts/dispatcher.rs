use std::sync::Arc;

use log::{info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{ingestion::IngestionClient, models::AlertReason};

/// Fire-and-forget delivery of attention alerts. Failures are logged and
/// dropped; nothing here is retried or surfaced to the learner.
#[derive(Clone)]
pub struct AlertDispatcher {
    ingestion: Arc<dyn IngestionClient>,
    session_id: watch::Receiver<Option<String>>,
}

impl AlertDispatcher {
    pub fn new(
        ingestion: Arc<dyn IngestionClient>,
        session_id: watch::Receiver<Option<String>>,
    ) -> Self {
        Self {
            ingestion,
            session_id,
        }
    }

    /// Returns the delivery task, mostly so tests can wait on it.
    pub fn raise(&self, reason: AlertReason) -> Option<JoinHandle<()>> {
        let Some(session_id) = self.session_id.borrow().clone() else {
            warn!("dropping {} alert: no session bound", reason.as_str());
            return None;
        };

        info!("raising {} alert for session {session_id}", reason.as_str());
        let ingestion = Arc::clone(&self.ingestion);
        Some(tokio::spawn(async move {
            if let Err(err) = ingestion.raise_attention_alert(&session_id, reason).await {
                warn!(
                    "{} alert for session {session_id} not delivered: {err:#}",
                    reason.as_str()
                );
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientMeta, TelemetryEvent};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FlakyAlerts {
        calls: Mutex<Vec<(String, AlertReason)>>,
    }

    #[async_trait]
    impl IngestionClient for FlakyAlerts {
        async fn start_session(&self, _lesson_id: &str, _meta: &ClientMeta) -> Result<String> {
            Ok("unused".into())
        }

        async fn send_events(&self, _session_id: &str, _events: &[TelemetryEvent]) -> Result<()> {
            Ok(())
        }

        async fn end_session(&self, _session_id: &str) -> Result<()> {
            Ok(())
        }

        async fn raise_attention_alert(&self, session_id: &str, reason: AlertReason) -> Result<()> {
            self.calls.lock().unwrap().push((session_id.to_string(), reason));
            Err(anyhow!("503 service unavailable"))
        }
    }

    #[tokio::test]
    async fn failed_alert_is_not_retried() {
        let sink = Arc::new(FlakyAlerts::default());
        let (_tx, rx) = watch::channel(Some("sess-9".to_string()));
        let dispatcher = AlertDispatcher::new(sink.clone(), rx);

        dispatcher
            .raise(AlertReason::LongEpisode)
            .unwrap()
            .await
            .unwrap();

        assert_eq!(
            *sink.calls.lock().unwrap(),
            vec![("sess-9".to_string(), AlertReason::LongEpisode)]
        );
    }

    #[tokio::test]
    async fn unbound_session_skips_delivery() {
        let sink = Arc::new(FlakyAlerts::default());
        let (_tx, rx) = watch::channel(None);
        let dispatcher = AlertDispatcher::new(sink.clone(), rx);

        assert!(dispatcher.raise(AlertReason::StudentBreak).is_none());
        assert!(sink.calls.lock().unwrap().is_empty());
    }
}
