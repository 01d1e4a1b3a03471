use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A still frame ready to be uploaded.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

/// One detected face.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FacePrediction {
    #[serde(default)]
    pub face_id: Option<serde_json::Value>,
    pub emotion: String,
    pub confidence: f64,
    #[serde(default)]
    pub coordinates: Option<serde_json::Value>,
    #[serde(default)]
    pub all_probabilities: HashMap<String, f64>,
}

/// Raw inference service response. Single-face services fill `emotion` and
/// `confidence`; multi-face services fill `predictions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InferenceResponse {
    pub success: bool,
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub predictions: Option<Vec<FacePrediction>>,
    #[serde(default)]
    pub message: Option<String>,
}
