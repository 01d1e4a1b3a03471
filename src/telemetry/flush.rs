use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::{
    ingestion::IngestionClient,
    models::SessionRequest,
};

use super::queue::EventQueue;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Buffer was empty.
    Skipped,
    Sent(usize),
}

enum FlushRequest {
    Flush {
        force: bool,
        reply: oneshot::Sender<Result<FlushOutcome>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Drains the event queue to the ingestion endpoint on a timer and on demand.
///
/// Owns the session binding: until `start_session` has succeeded, events stay
/// buffered and nothing is sent.
pub struct FlushEngine {
    queue: EventQueue,
    ingestion: Arc<dyn IngestionClient>,
    request: SessionRequest,
    session_id: watch::Sender<Option<String>>,
    interval: Duration,
}

impl FlushEngine {
    pub fn new(
        queue: EventQueue,
        ingestion: Arc<dyn IngestionClient>,
        request: SessionRequest,
        interval: Duration,
    ) -> Self {
        let (session_id, _) = watch::channel(None);
        Self {
            queue,
            ingestion,
            request,
            session_id,
            interval,
        }
    }

    pub fn subscribe_session(&self) -> watch::Receiver<Option<String>> {
        self.session_id.subscribe()
    }

    /// Start the ingestion session if that has not happened yet.
    pub async fn bind(&mut self) -> Result<String> {
        if let Some(id) = self.session_id.borrow().clone() {
            return Ok(id);
        }

        let id = self
            .ingestion
            .start_session(&self.request.lesson_id, &self.request.meta)
            .await
            .with_context(|| format!("failed to start session for lesson {}", self.request.lesson_id))?;

        log_info!("session {id} bound for lesson {}", self.request.lesson_id);
        self.session_id.send_replace(Some(id.clone()));
        Ok(id)
    }

    pub fn spawn(self) -> FlushHandle {
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(self.run(rx));
        FlushHandle { tx, handle }
    }

    async fn run(mut self, mut requests: mpsc::Receiver<FlushRequest>) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Failures already restored the batch; the next tick retries.
                    let _ = self.flush(false).await;
                }
                request = requests.recv() => match request {
                    Some(FlushRequest::Flush { force, reply }) => {
                        let result = self.flush(force).await;
                        let _ = reply.send(result);
                    }
                    Some(FlushRequest::Close { reply }) => {
                        self.close().await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.close().await;
                        break;
                    }
                }
            }
        }
    }

    async fn flush(&mut self, force: bool) -> Result<FlushOutcome> {
        if !force && self.queue.is_empty() {
            return Ok(FlushOutcome::Skipped);
        }

        let session_id = match self.bind().await {
            Ok(id) => id,
            Err(err) => {
                log_warn!("holding {} events, no session yet: {err:#}", self.queue.len());
                return Err(err);
            }
        };

        let batch = self.queue.detach();
        if batch.is_empty() {
            return Ok(FlushOutcome::Skipped);
        }

        let count = batch.len();
        match self.ingestion.send_events(&session_id, &batch).await {
            Ok(()) => {
                log_debug!("flushed {count} events for session {session_id}");
                Ok(FlushOutcome::Sent(count))
            }
            Err(err) => {
                self.queue.restore(batch);
                log_warn!(
                    "flush of {count} events failed for session {session_id}, kept for retry: {err:#}"
                );
                Err(err)
            }
        }
    }

    /// Final forced flush, then end the session exactly once. Both are attempted
    /// even if the flush fails.
    async fn close(&mut self) {
        if let Err(err) = self.flush(true).await {
            log_warn!(
                "final flush failed, {} events not delivered: {err:#}",
                self.queue.len()
            );
        }

        let session_id = self.session_id.borrow().clone();
        match session_id {
            Some(id) => match self.ingestion.end_session(&id).await {
                Ok(()) => log_info!("session {id} ended"),
                Err(err) => log_warn!("failed to end session {id}: {err:#}"),
            },
            None => log_warn!("no session was ever bound, nothing to end"),
        }
    }
}

/// Handle to a running flush engine.
pub struct FlushHandle {
    tx: mpsc::Sender<FlushRequest>,
    handle: JoinHandle<()>,
}

impl FlushHandle {
    pub async fn flush(&self, force: bool) -> Result<FlushOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(FlushRequest::Flush { force, reply })
            .await
            .map_err(|_| anyhow!("flush engine stopped"))?;
        rx.await.map_err(|_| anyhow!("flush engine dropped request"))?
    }

    /// Final flush + end session, then wait for the engine to exit.
    pub async fn close(self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(FlushRequest::Close { reply }).await.is_ok() {
            let _ = rx.await;
        }
        self.handle.await.context("flush engine task failed to join")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertReason, ClientMeta, EventBody, SessionContext, TelemetryEvent};
    use async_trait::async_trait;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedIngestion {
        start_failures: AtomicUsize,
        send_failures: AtomicUsize,
        starts: AtomicUsize,
        batches: Mutex<Vec<Vec<TelemetryEvent>>>,
        ended: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl IngestionClient for ScriptedIngestion {
        async fn start_session(&self, _lesson_id: &str, _meta: &ClientMeta) -> Result<String> {
            if self.start_failures.load(Ordering::SeqCst) > 0 {
                self.start_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(anyhow!("api unreachable"));
            }
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok("sess-1".into())
        }

        async fn send_events(&self, _session_id: &str, events: &[TelemetryEvent]) -> Result<()> {
            if self.send_failures.load(Ordering::SeqCst) > 0 {
                self.send_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(anyhow!("502 bad gateway"));
            }
            self.batches.lock().unwrap().push(events.to_vec());
            Ok(())
        }

        async fn end_session(&self, session_id: &str) -> Result<()> {
            self.ended.lock().unwrap().push(session_id.to_string());
            Ok(())
        }

        async fn raise_attention_alert(&self, _session_id: &str, _reason: AlertReason) -> Result<()> {
            Ok(())
        }
    }

    fn request() -> SessionRequest {
        SessionRequest {
            lesson_id: "lesson-7".into(),
            meta: ClientMeta::new(Some("learner-1".into()), SessionContext::Lesson, 3000),
        }
    }

    fn labels(events: &[TelemetryEvent]) -> Vec<String> {
        events
            .iter()
            .map(|event| match &event.body {
                EventBody::Emotion { label } => label.clone(),
                other => other.kind().to_string(),
            })
            .collect()
    }

    fn engine(ingestion: &Arc<ScriptedIngestion>, queue: &EventQueue) -> FlushEngine {
        FlushEngine::new(
            queue.clone(),
            Arc::clone(ingestion) as Arc<dyn IngestionClient>,
            request(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn failed_flush_keeps_order_without_duplicates() {
        let ingestion = Arc::new(ScriptedIngestion::default());
        ingestion.send_failures.store(1, Ordering::SeqCst);
        let queue = EventQueue::new(100);
        let mut engine = engine(&ingestion, &queue);

        queue.enqueue(TelemetryEvent::emotion("happy", Utc::now()));
        queue.enqueue(TelemetryEvent::emotion("sad", Utc::now()));
        assert!(engine.flush(false).await.is_err());
        assert_eq!(queue.len(), 2);

        queue.enqueue(TelemetryEvent::emotion("neutral", Utc::now()));
        let outcome = engine.flush(false).await.unwrap();

        assert_eq!(outcome, FlushOutcome::Sent(3));
        let batches = ingestion.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(labels(&batches[0]), vec!["happy", "sad", "neutral"]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn empty_buffer_is_a_no_op() {
        let ingestion = Arc::new(ScriptedIngestion::default());
        let queue = EventQueue::new(100);
        let mut engine = engine(&ingestion, &queue);

        assert_eq!(engine.flush(false).await.unwrap(), FlushOutcome::Skipped);
        assert_eq!(ingestion.starts.load(Ordering::SeqCst), 0);
        assert!(ingestion.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn events_wait_for_session_binding() {
        let ingestion = Arc::new(ScriptedIngestion::default());
        ingestion.start_failures.store(1, Ordering::SeqCst);
        let queue = EventQueue::new(100);
        let mut engine = engine(&ingestion, &queue);
        let session = engine.subscribe_session();

        assert!(engine.bind().await.is_err());
        queue.enqueue(TelemetryEvent::attention(0.4, Utc::now()));
        assert!(session.borrow().is_none());

        assert_eq!(engine.flush(false).await.unwrap(), FlushOutcome::Sent(1));
        assert_eq!(session.borrow().as_deref(), Some("sess-1"));
        assert_eq!(ingestion.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_flushes_and_close_ends_once() {
        let ingestion = Arc::new(ScriptedIngestion::default());
        let queue = EventQueue::new(100);
        let mut engine = engine(&ingestion, &queue);
        engine.bind().await.unwrap();
        let handle = engine.spawn();

        queue.enqueue(TelemetryEvent::attention(0.9, Utc::now()));
        time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(ingestion.batches.lock().unwrap().len(), 1);

        queue.enqueue(TelemetryEvent::attention(0.2, Utc::now()));
        handle.close().await.unwrap();

        assert_eq!(ingestion.batches.lock().unwrap().len(), 2);
        assert_eq!(*ingestion.ended.lock().unwrap(), vec!["sess-1".to_string()]);
    }
}
