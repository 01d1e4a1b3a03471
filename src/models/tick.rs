use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Emotion label reported by the inference service.
///
/// Labels outside the known set are kept verbatim in `Other` so they still
/// reach telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Emotion {
    Happy,
    Surprise,
    Neutral,
    Fear,
    Angry,
    Sad,
    Disgust,
    Other(String),
}

impl Emotion {
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "happy" => Emotion::Happy,
            "surprise" | "surprised" => Emotion::Surprise,
            "neutral" => Emotion::Neutral,
            "fear" | "fearful" => Emotion::Fear,
            "angry" | "anger" => Emotion::Angry,
            "sad" | "sadness" => Emotion::Sad,
            "disgust" | "disgusted" => Emotion::Disgust,
            other => Emotion::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
            Emotion::Fear => "fear",
            Emotion::Angry => "angry",
            Emotion::Sad => "sad",
            Emotion::Disgust => "disgust",
            Emotion::Other(label) => label,
        }
    }

    /// Sad, angry, fear and disgust count as a bad tick regardless of score.
    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            Emotion::Sad | Emotion::Angry | Emotion::Fear | Emotion::Disgust
        )
    }
}

impl From<String> for Emotion {
    fn from(value: String) -> Self {
        Emotion::parse(&value)
    }
}

impl From<Emotion> for String {
    fn from(value: Emotion) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One successful capture-and-inference cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickResult {
    pub emotion: Emotion,
    pub confidence: f64,
    pub attention_score: f64,
    pub face_count: usize,
    pub captured_at: DateTime<Utc>,
}
