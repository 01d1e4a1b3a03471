use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event body, serialized as `{"type": ..., "payload": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventBody {
    Attention {
        score: f64,
    },
    Emotion {
        label: String,
    },
    #[serde(rename_all = "camelCase")]
    MicroBreakStarted {
        episode_id: String,
        reason: String,
        content_id: String,
    },
    #[serde(rename_all = "camelCase")]
    MicroBreakEnded {
        episode_id: String,
        duration_ms: u64,
        close_reason: String,
    },
}

impl EventBody {
    pub fn kind(&self) -> &'static str {
        match self {
            EventBody::Attention { .. } => "attention",
            EventBody::Emotion { .. } => "emotion",
            EventBody::MicroBreakStarted { .. } => "micro_break_started",
            EventBody::MicroBreakEnded { .. } => "micro_break_ended",
        }
    }
}

/// A single telemetry record. Immutable once built; owned by the event queue
/// until a flush is acknowledged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryEvent {
    /// Lets ingestion sinks drop redelivered events.
    pub id: String,
    #[serde(flatten)]
    pub body: EventBody,
    pub ts: DateTime<Utc>,
}

impl TelemetryEvent {
    pub fn new(body: EventBody, ts: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            body,
            ts,
        }
    }

    pub fn attention(score: f64, ts: DateTime<Utc>) -> Self {
        Self::new(EventBody::Attention { score }, ts)
    }

    pub fn emotion(label: impl Into<String>, ts: DateTime<Utc>) -> Self {
        Self::new(
            EventBody::Emotion {
                label: label.into(),
            },
            ts,
        )
    }

    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attention_event_uses_type_payload_shape() {
        let ts = Utc::now();
        let event = TelemetryEvent::attention(0.56, ts);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], json!("attention"));
        assert_eq!(value["payload"], json!({ "score": 0.56 }));
        assert_eq!(value["id"], json!(event.id));
        assert!(value.get("ts").is_some());
    }

    #[test]
    fn micro_break_payload_is_camel_case() {
        let event = TelemetryEvent::new(
            EventBody::MicroBreakEnded {
                episode_id: "ep-1".into(),
                duration_ms: 1200,
                close_reason: "dismissed".into(),
            },
            Utc::now(),
        );
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], json!("micro_break_ended"));
        assert_eq!(value["payload"]["durationMs"], json!(1200));
        assert_eq!(event.kind(), "micro_break_ended");
    }
}
