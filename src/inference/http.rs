use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    StatusCode,
};

use crate::error::CaptureError;

use super::{EncodedFrame, InferenceClient, InferenceResponse};

/// Posts frames as `multipart/form-data` (`image` + `session_id`).
pub struct HttpInferenceClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpInferenceClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("inference HTTP client init failed: {e}"))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn infer(
        &self,
        frame: &EncodedFrame,
        session_id: Option<&str>,
    ) -> Result<InferenceResponse, CaptureError> {
        let part = Part::bytes(frame.bytes.clone())
            .file_name("frame.jpg")
            .mime_str(frame.mime)
            .map_err(|e| CaptureError::Frame(e.to_string()))?;

        let mut form = Form::new().part("image", part);
        if let Some(session_id) = session_id {
            form = form.text("session_id", session_id.to_string());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CaptureError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| CaptureError::Network(e.to_string()))?;
        decode_reply(status, &body)
    }
}

/// Error statuses still carry the service's `{success:false, message}`
/// payload when it could classify the frame; only other bodies are
/// transport failures.
fn decode_reply(status: StatusCode, body: &[u8]) -> Result<InferenceResponse, CaptureError> {
    if status.is_success() {
        return serde_json::from_slice(body).map_err(|e| CaptureError::Malformed(e.to_string()));
    }
    match serde_json::from_slice::<InferenceResponse>(body) {
        Ok(reply) if !reply.success => Ok(reply),
        _ => Err(CaptureError::Network(format!(
            "inference service returned HTTP {status}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::normalize;
    use chrono::Utc;

    #[test]
    fn error_status_with_no_face_payload_is_classified() {
        let body = br#"{"success": false, "message": "No face detected"}"#;
        let reply = decode_reply(StatusCode::UNPROCESSABLE_ENTITY, body).unwrap();
        assert!(matches!(normalize(reply, Utc::now()), Err(CaptureError::NoFace)));
    }

    #[test]
    fn error_status_without_payload_is_a_network_error() {
        let err = decode_reply(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, CaptureError::Network(msg) if msg.contains("502")));
    }

    #[test]
    fn garbled_success_body_is_malformed() {
        let err = decode_reply(StatusCode::OK, b"{not json").unwrap_err();
        assert!(matches!(err, CaptureError::Malformed(_)));
    }
}
