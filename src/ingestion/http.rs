use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{AlertReason, ClientMeta, TelemetryEvent};

use super::IngestionClient;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionBody<'a> {
    lesson_id: &'a str,
    #[serde(flatten)]
    meta: &'a ClientMeta,
}

#[derive(Deserialize)]
struct StartSessionReply {
    #[serde(alias = "sessionId")]
    session_id: String,
}

#[derive(Serialize)]
struct EventsBody<'a> {
    events: &'a [TelemetryEvent],
}

#[derive(Serialize)]
struct AlertBody {
    reason: &'static str,
}

/// Talks to the lesson backend's session API.
pub struct HttpIngestion {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpIngestion {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("ingestion HTTP client init failed: {e}"))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl IngestionClient for HttpIngestion {
    async fn start_session(&self, lesson_id: &str, meta: &ClientMeta) -> Result<String> {
        let reply: StartSessionReply = self
            .post("/sessions/start")
            .json(&StartSessionBody { lesson_id, meta })
            .send()
            .await
            .context("session start request failed")?
            .error_for_status()
            .context("session start rejected")?
            .json()
            .await
            .context("session start reply was not valid JSON")?;

        Ok(reply.session_id)
    }

    async fn send_events(&self, session_id: &str, events: &[TelemetryEvent]) -> Result<()> {
        self.post(&format!("/sessions/{session_id}/events"))
            .json(&EventsBody { events })
            .send()
            .await
            .with_context(|| format!("sending {} events failed", events.len()))?
            .error_for_status()
            .context("event batch rejected")?;
        Ok(())
    }

    async fn end_session(&self, session_id: &str) -> Result<()> {
        self.post(&format!("/sessions/{session_id}/end"))
            .send()
            .await
            .context("session end request failed")?
            .error_for_status()
            .context("session end rejected")?;
        Ok(())
    }

    async fn raise_attention_alert(&self, session_id: &str, reason: AlertReason) -> Result<()> {
        self.post(&format!("/sessions/{session_id}/alerts"))
            .json(&AlertBody {
                reason: reason.as_str(),
            })
            .send()
            .await
            .context("alert request failed")?
            .error_for_status()
            .context("alert rejected")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionContext;
    use serde_json::json;

    #[test]
    fn start_body_flattens_client_meta() {
        let meta = ClientMeta::new(Some("kid-7".into()), SessionContext::Quiz, 3000);
        let body = serde_json::to_value(StartSessionBody {
            lesson_id: "fractions-1",
            meta: &meta,
        })
        .unwrap();

        assert_eq!(body["lessonId"], json!("fractions-1"));
        assert_eq!(body["context"], json!("quiz"));
    }

    #[test]
    fn start_reply_accepts_both_casings() {
        let snake: StartSessionReply =
            serde_json::from_value(json!({ "session_id": "abc" })).unwrap();
        let camel: StartSessionReply =
            serde_json::from_value(json!({ "sessionId": "abc" })).unwrap();
        assert_eq!(snake.session_id, camel.session_id);
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client = HttpIngestion::new("http://api.local/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url, "http://api.local");
    }
}
