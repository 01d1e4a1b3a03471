use anyhow::Result;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::{
    alerts::AlertFlags,
    error::CaptureError,
    intervention::{InterventionPhase, StreakState, TickOutcome},
    models::{ClosedEpisode, MicroBreakEpisode, TickResult},
    telemetry::FlushOutcome,
};

/// Point-in-time view of a monitored session, for overlays and debugging.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub lesson_id: String,
    pub tracking: bool,
    pub phase: InterventionPhase,
    pub streak: StreakState,
    pub active_episode: Option<MicroBreakEpisode>,
    pub episodes_opened: u32,
    pub alerts: AlertFlags,
    pub pending_events: usize,
    pub evicted_events: u64,
}

pub(crate) enum SessionCommand {
    StartTracking {
        reply: oneshot::Sender<Result<(), CaptureError>>,
    },
    StopTracking {
        reply: oneshot::Sender<Option<ClosedEpisode>>,
    },
    Dismiss {
        reply: oneshot::Sender<Option<ClosedEpisode>>,
    },
    StudentBreak {
        reply: oneshot::Sender<bool>,
    },
    VisibilityChanged {
        hidden: bool,
    },
    Flush {
        force: bool,
        reply: oneshot::Sender<Result<FlushOutcome>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Sample {
        tick: TickResult,
        reply: oneshot::Sender<TickOutcome>,
    },
    Teardown {
        reply: oneshot::Sender<()>,
    },
}
