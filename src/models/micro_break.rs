use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// An item from the micro-break content library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MicroBreakContent {
    #[serde(alias = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default, alias = "youtube_url")]
    pub youtube_url: String,
    #[serde(default, alias = "booster_text")]
    pub booster_text: String,
}

impl MicroBreakContent {
    /// Shown when the library is empty or could not be loaded.
    pub fn fallback() -> Self {
        Self {
            id: "default".into(),
            title: "Time for a little break".into(),
            youtube_url: String::new(),
            booster_text: "You are doing great! Take a deep breath, stretch, and we will continue together.".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    LowAttention,
    NegativeEmotion,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::LowAttention => "low_attention",
            TriggerReason::NegativeEmotion => "negative_emotion",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Dismissed,
    TrackingStopped,
    SessionEnded,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Dismissed => "dismissed",
            CloseReason::TrackingStopped => "tracking_stopped",
            CloseReason::SessionEnded => "session_ended",
        }
    }
}

/// One open-to-closed micro-break intervention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroBreakEpisode {
    pub id: String,
    pub trigger_reason: TriggerReason,
    pub content: MicroBreakContent,
    pub started_at: DateTime<Utc>,
    pub is_active: bool,
    /// Monotonic anchor for duration-based alerting.
    #[serde(skip, default = "Instant::now")]
    pub opened_at: Instant,
}

impl MicroBreakEpisode {
    pub fn elapsed_at(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.opened_at)
    }
}

/// An episode after the learner (or teardown) closed it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedEpisode {
    pub episode: MicroBreakEpisode,
    pub duration_ms: u64,
    pub close_reason: CloseReason,
}
