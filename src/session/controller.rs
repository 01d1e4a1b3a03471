use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use log::{error, info, warn};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::{
    alerts::{AlertDispatcher, AlertFlags},
    capture::{shared, Camera, CaptureController, CaptureDisplay},
    inference::InferenceClient,
    ingestion::IngestionClient,
    intervention::{ContentLibrary, InterventionEngine, TickOutcome},
    models::{
        ClosedEpisode, EventBody, MicroBreakContent, MicroBreakEpisode, SessionRequest,
        TelemetryEvent, TickResult,
    },
    settings::{AlertSettings, MonitorConfig},
    telemetry::{EventQueue, FlushEngine, FlushHandle, FlushOutcome},
};

use super::state::{SessionCommand, SessionSnapshot};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// External services a monitored session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub inference: Arc<dyn InferenceClient>,
    pub ingestion: Arc<dyn IngestionClient>,
    pub library: Arc<dyn ContentLibrary>,
}

/// Opens monitored sessions. One per host; each trackable screen gets its
/// own `SessionHandle`.
#[derive(Clone)]
pub struct SessionMonitor {
    collaborators: Collaborators,
    config: MonitorConfig,
}

impl SessionMonitor {
    pub fn new(collaborators: Collaborators, config: MonitorConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Bind the session, load the micro-break library and spawn the actor.
    ///
    /// Neither a failed `start_session` nor an unreachable library is fatal:
    /// binding is retried before each flush and an empty library falls back
    /// to the built-in break.
    pub async fn open(&self, request: SessionRequest, camera: Box<dyn Camera>) -> Result<SessionHandle> {
        if request.lesson_id.trim().is_empty() {
            bail!("cannot open a session without a lesson id");
        }

        let config = &self.config;
        let Collaborators {
            inference,
            ingestion,
            library,
        } = self.collaborators.clone();

        let queue = EventQueue::new(config.telemetry.max_buffered_events);
        let mut flush = FlushEngine::new(
            queue.clone(),
            Arc::clone(&ingestion),
            request.clone(),
            config.telemetry.flush_interval(),
        );
        if let Err(err) = flush.bind().await {
            warn!(
                "could not start session for lesson {}, retrying on flush: {err:#}",
                request.lesson_id
            );
        }
        let session_id = flush.subscribe_session();

        let library = match library.list().await {
            Ok(items) => {
                info!("loaded {} micro-break items", items.len());
                items
            }
            Err(err) => {
                warn!("micro-break library unavailable, using built-in break: {err:#}");
                Vec::new()
            }
        };

        let (samples_tx, samples_rx) = mpsc::channel(config.capture.sample_channel_capacity.max(1));
        let capture = CaptureController::new(
            shared(camera),
            inference,
            samples_tx,
            session_id.clone(),
            config.capture.clone(),
        );
        let tracking = capture.subscribe_tracking();
        let display = capture.subscribe_display();
        let (episode_tx, episode_rx) = watch::channel(None);
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let actor = SessionActor {
            lesson_id: request.lesson_id.clone(),
            engine: InterventionEngine::new(config.intervention.clone()),
            flags: AlertFlags::new(),
            alert_rules: config.alerts.clone(),
            capture,
            queue,
            flush: Some(flush.spawn()),
            dispatcher: AlertDispatcher::new(ingestion, session_id.clone()),
            library,
            session_id: session_id.clone(),
            episode: episode_tx,
        };
        let handle = tokio::spawn(actor.run(samples_rx, commands_rx));

        info!("monitoring lesson {}", request.lesson_id);
        Ok(SessionHandle {
            commands: commands_tx,
            tracking,
            display,
            episode: episode_rx,
            session_id,
            actor: Some(handle),
        })
    }
}

/// The screen's side of a monitored session. Dropping it without calling
/// `teardown` still tears the session down in the background.
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    tracking: watch::Receiver<bool>,
    display: watch::Receiver<CaptureDisplay>,
    episode: watch::Receiver<Option<MicroBreakEpisode>>,
    session_id: watch::Receiver<Option<String>>,
    actor: Option<JoinHandle<()>>,
}

impl SessionHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| anyhow!("session actor stopped"))?;
        rx.await.map_err(|_| anyhow!("session actor dropped request"))
    }

    /// Device errors come back as a `CaptureError` inside the `anyhow` error.
    pub async fn start_tracking(&self) -> Result<()> {
        self.request(|reply| SessionCommand::StartTracking { reply })
            .await?
            .map_err(anyhow::Error::from)
    }

    pub async fn stop_tracking(&self) -> Result<Option<ClosedEpisode>> {
        self.request(|reply| SessionCommand::StopTracking { reply }).await
    }

    /// The learner pressed "continue" on the break overlay.
    pub async fn dismiss_break(&self) -> Result<Option<ClosedEpisode>> {
        self.request(|reply| SessionCommand::Dismiss { reply }).await
    }

    /// Returns whether an alert was raised. Ignored when no break is open.
    pub async fn request_student_break(&self) -> Result<bool> {
        self.request(|reply| SessionCommand::StudentBreak { reply }).await
    }

    pub async fn visibility_changed(&self, hidden: bool) -> Result<()> {
        self.commands
            .send(SessionCommand::VisibilityChanged { hidden })
            .await
            .map_err(|_| anyhow!("session actor stopped"))
    }

    pub async fn flush(&self, force: bool) -> Result<FlushOutcome> {
        self.request(|reply| SessionCommand::Flush { force, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Feed a tick produced by the host's own inference.
    pub async fn submit_sample(&self, tick: TickResult) -> Result<TickOutcome> {
        self.request(|reply| SessionCommand::Sample { tick, reply })
            .await
    }

    pub fn subscribe_tracking(&self) -> watch::Receiver<bool> {
        self.tracking.clone()
    }

    pub fn subscribe_display(&self) -> watch::Receiver<CaptureDisplay> {
        self.display.clone()
    }

    pub fn subscribe_episode(&self) -> watch::Receiver<Option<MicroBreakEpisode>> {
        self.episode.clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.borrow().clone()
    }

    /// Stop tracking, close any open break, flush, then end the session.
    pub async fn teardown(mut self) -> Result<()> {
        let sent = self.request(|reply| SessionCommand::Teardown { reply }).await;
        if let Some(actor) = self.actor.take() {
            actor
                .await
                .map_err(|err| anyhow!("session actor failed to join: {err}"))?;
        }
        sent
    }
}

struct SessionActor {
    lesson_id: String,
    engine: InterventionEngine,
    flags: AlertFlags,
    alert_rules: AlertSettings,
    capture: CaptureController,
    queue: EventQueue,
    flush: Option<FlushHandle>,
    dispatcher: AlertDispatcher,
    library: Vec<MicroBreakContent>,
    session_id: watch::Receiver<Option<String>>,
    episode: watch::Sender<Option<MicroBreakEpisode>>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut samples: mpsc::Receiver<TickResult>,
        mut commands: mpsc::Receiver<SessionCommand>,
    ) {
        let check_every = self.alert_rules.long_episode_check();
        let mut long_check = time::interval_at(Instant::now() + check_every, check_every);
        long_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let checking = self.engine.active_episode().is_some() && self.flags.wants_long_episode_checks();

            tokio::select! {
                Some(tick) = samples.recv() => {
                    // Anything still queued from before a stop is stale.
                    if self.capture.is_active() {
                        if self.observe(tick).opened.is_some() {
                            long_check.reset();
                        }
                    }
                }
                _ = long_check.tick(), if checking => {
                    self.check_long_episode();
                }
                command = commands.recv() => match command {
                    Some(SessionCommand::Sample { tick, reply }) => {
                        let outcome = self.observe(tick);
                        if outcome.opened.is_some() {
                            long_check.reset();
                        }
                        let _ = reply.send(outcome);
                    }
                    Some(SessionCommand::StartTracking { reply }) => {
                        discard_stale(&mut samples);
                        let result = self.capture.start().await;
                        if result.is_ok() {
                            self.engine.on_tracking_started();
                        }
                        let _ = reply.send(result);
                    }
                    Some(SessionCommand::StopTracking { reply }) => {
                        let closed = self.stop_tracking().await;
                        discard_stale(&mut samples);
                        let _ = reply.send(closed);
                    }
                    Some(SessionCommand::Dismiss { reply }) => {
                        let closed = self.engine.dismiss(Instant::now());
                        if let Some(closed) = &closed {
                            self.record_closed(closed);
                        }
                        let _ = reply.send(closed);
                    }
                    Some(SessionCommand::StudentBreak { reply }) => {
                        let _ = reply.send(self.student_break());
                    }
                    Some(SessionCommand::VisibilityChanged { hidden }) => {
                        if hidden {
                            if let Err(err) = self.flush_now(true).await {
                                warn!("flush on hide failed: {err:#}");
                            }
                        }
                    }
                    Some(SessionCommand::Flush { force, reply }) => {
                        let _ = reply.send(self.flush_now(force).await);
                    }
                    Some(SessionCommand::Snapshot { reply }) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(SessionCommand::Teardown { reply }) => {
                        self.teardown().await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        info!("session handle dropped, tearing down lesson {}", self.lesson_id);
                        self.teardown().await;
                        break;
                    }
                }
            }
        }
    }

    fn observe(&mut self, tick: TickResult) -> TickOutcome {
        self.queue.extend([
            TelemetryEvent::attention(tick.attention_score, tick.captured_at),
            TelemetryEvent::emotion(tick.emotion.as_str(), tick.captured_at),
        ]);

        let outcome = self.engine.on_tick(&tick, &self.library, Instant::now());
        if let Some(episode) = &outcome.opened {
            info!(
                "micro-break {} opened ({}, streak {}): {}",
                episode.id,
                episode.trigger_reason.as_str(),
                outcome.streak.bad_streak_count,
                episode.content.title
            );
            self.queue.enqueue(TelemetryEvent::new(
                EventBody::MicroBreakStarted {
                    episode_id: episode.id.clone(),
                    reason: episode.trigger_reason.as_str().to_string(),
                    content_id: episode.content.id.clone(),
                },
                episode.started_at,
            ));
            self.episode.send_replace(Some(episode.clone()));

            if let Some(reason) = self
                .flags
                .on_episode_opened(self.engine.episodes_opened(), &self.alert_rules)
            {
                self.dispatcher.raise(reason);
            }
        }
        outcome
    }

    fn record_closed(&mut self, closed: &ClosedEpisode) {
        info!(
            "micro-break {} closed ({}) after {}ms",
            closed.episode.id,
            closed.close_reason.as_str(),
            closed.duration_ms
        );
        self.queue.enqueue(TelemetryEvent::new(
            EventBody::MicroBreakEnded {
                episode_id: closed.episode.id.clone(),
                duration_ms: closed.duration_ms,
                close_reason: closed.close_reason.as_str().to_string(),
            },
            chrono::Utc::now(),
        ));
        self.episode.send_replace(None);
    }

    fn check_long_episode(&mut self) {
        let Some(episode) = self.engine.active_episode() else {
            return;
        };
        let elapsed = episode.elapsed_at(Instant::now());
        if let Some(reason) = self.flags.check_long_episode(elapsed, &self.alert_rules) {
            self.dispatcher.raise(reason);
        }
    }

    fn student_break(&mut self) -> bool {
        if self.engine.active_episode().is_none() {
            warn!("student break requested with no open micro-break, ignoring");
            return false;
        }
        match self.flags.on_student_break(Instant::now(), &self.alert_rules) {
            Some(reason) => {
                self.dispatcher.raise(reason);
                true
            }
            None => false,
        }
    }

    async fn stop_tracking(&mut self) -> Option<ClosedEpisode> {
        match self.capture.stop().await {
            Ok(false) => return None,
            Ok(true) => {}
            Err(err) => error!("capture loop did not stop cleanly: {err:#}"),
        }
        let closed = self.engine.on_tracking_stopped(Instant::now());
        if let Some(closed) = &closed {
            self.record_closed(closed);
        }
        closed
    }

    async fn flush_now(&self, force: bool) -> Result<FlushOutcome> {
        match &self.flush {
            Some(flush) => flush.flush(force).await,
            None => Err(anyhow!("session already torn down")),
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.borrow().clone(),
            lesson_id: self.lesson_id.clone(),
            tracking: self.capture.is_active(),
            phase: self.engine.phase(),
            streak: self.engine.streak(),
            active_episode: self.engine.active_episode().cloned(),
            episodes_opened: self.engine.episodes_opened(),
            alerts: self.flags.clone(),
            pending_events: self.queue.len(),
            evicted_events: self.queue.evicted(),
        }
    }

    async fn teardown(&mut self) {
        self.stop_tracking().await;
        if let Some(closed) = self.engine.end_session(Instant::now()) {
            self.record_closed(&closed);
        }
        if let Some(flush) = self.flush.take() {
            if let Err(err) = flush.close().await {
                error!("flush engine did not close cleanly: {err:#}");
            }
        }
        info!("session for lesson {} torn down", self.lesson_id);
    }
}

/// Ticks captured by a previous tracking run must never reach a fresh streak.
fn discard_stale(samples: &mut mpsc::Receiver<TickResult>) {
    let mut dropped = 0;
    while samples.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        info!("discarded {dropped} ticks from the previous tracking run");
    }
}
