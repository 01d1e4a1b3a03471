use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason codes sent with `raise_attention_alert`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertReason {
    MultipleEpisodes,
    LongEpisode,
    StudentBreak,
}

impl AlertReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertReason::MultipleEpisodes => "multiple_episodes",
            AlertReason::LongEpisode => "long_episode",
            AlertReason::StudentBreak => "student_break",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "multiple_episodes" => Some(AlertReason::MultipleEpisodes),
            "long_episode" => Some(AlertReason::LongEpisode),
            "student_break" => Some(AlertReason::StudentBreak),
            _ => None,
        }
    }
}

/// Alert row as stored by the local ingestion sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttentionAlert {
    pub id: Option<i64>,
    pub session_id: String,
    pub reason: AlertReason,
    pub raised_at: DateTime<Utc>,
}
