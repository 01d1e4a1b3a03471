use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

use crate::models::MicroBreakContent;

pub const INFERENCE_URL_ENV: &str = "ATTENTIO_INFERENCE_URL";
pub const API_URL_ENV: &str = "ATTENTIO_API_URL";
pub const API_TOKEN_ENV: &str = "ATTENTIO_API_TOKEN";

/// Capture loop cadence and frame handling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureSettings {
    pub interval_ms: u64,
    /// Upper bound on a single grab + encode + inference round trip.
    pub inference_timeout_ms: u64,
    pub max_frame_width: u32,
    pub jpeg_quality: u8,
    pub sample_channel_capacity: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            interval_ms: 3000,
            inference_timeout_ms: 10_000,
            max_frame_width: 640,
            jpeg_quality: 80,
            sample_channel_capacity: 32,
        }
    }
}

impl CaptureSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetrySettings {
    pub flush_interval_ms: u64,
    /// Oldest events are evicted (and logged) past this many pending events.
    pub max_buffered_events: usize,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            flush_interval_ms: 5000,
            max_buffered_events: 10_000,
        }
    }
}

impl TelemetrySettings {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }
}

/// Streak thresholds for the intervention engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InterventionSettings {
    /// Scores at or below this count as a bad tick.
    pub bad_attention_threshold: f64,
    pub low_attention_streak: u32,
    pub trigger_streak: u32,
}

impl Default for InterventionSettings {
    fn default() -> Self {
        Self {
            bad_attention_threshold: 0.5,
            low_attention_streak: 2,
            trigger_streak: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertSettings {
    pub multiple_episodes_threshold: u32,
    pub long_episode_secs: u64,
    pub long_episode_check_ms: u64,
    pub student_break_cooldown_secs: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            multiple_episodes_threshold: 3,
            long_episode_secs: 60,
            long_episode_check_ms: 5000,
            student_break_cooldown_secs: 60,
        }
    }
}

impl AlertSettings {
    pub fn long_episode_after(&self) -> Duration {
        Duration::from_secs(self.long_episode_secs)
    }

    pub fn long_episode_check(&self) -> Duration {
        Duration::from_millis(self.long_episode_check_ms.max(1))
    }

    pub fn student_break_cooldown(&self) -> Duration {
        Duration::from_secs(self.student_break_cooldown_secs)
    }
}

/// Collaborator endpoints. Any field may be overridden from the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EndpointSettings {
    pub inference_url: Option<String>,
    pub api_base_url: Option<String>,
    pub api_token: Option<String>,
    pub request_timeout_ms: Option<u64>,
}

impl EndpointSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.unwrap_or(15_000))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub capture: CaptureSettings,
    pub telemetry: TelemetrySettings,
    pub intervention: InterventionSettings,
    pub alerts: AlertSettings,
    pub endpoints: EndpointSettings,
    /// Used instead of a remote library when no API base URL is configured.
    pub micro_breaks: Vec<MicroBreakContent>,
}

impl MonitorConfig {
    /// Live lesson/quiz path: one frame every three seconds.
    pub fn lesson() -> Self {
        Self::default()
    }

    /// Generic telemetry hook: faster sampling, same policies.
    pub fn telemetry_hook() -> Self {
        let mut config = Self::default();
        config.capture.interval_ms = 1500;
        config
    }

    /// Read the JSON config at `path`; a missing file yields defaults.
    /// Endpoint environment variables override either.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid settings in {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(INFERENCE_URL_ENV) {
            self.endpoints.inference_url = Some(url);
        }
        if let Ok(url) = std::env::var(API_URL_ENV) {
            self.endpoints.api_base_url = Some(url);
        }
        if let Ok(token) = std::env::var(API_TOKEN_ENV) {
            self.endpoints.api_token = Some(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attentio.json");
        fs::write(&path, r#"{ "capture": { "interval_ms": 1500 } }"#).unwrap();

        let config = MonitorConfig::load(&path).unwrap();

        assert_eq!(config.capture.interval_ms, 1500);
        assert_eq!(config.capture.jpeg_quality, 80);
        assert_eq!(config.telemetry.flush_interval_ms, 5000);
        assert_eq!(config.intervention.trigger_streak, 3);
        assert_eq!(config.alerts.long_episode_secs, 60);
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = MonitorConfig::load(&dir.path().join("absent.json")).unwrap();

        assert_eq!(config.capture, CaptureSettings::default());
        assert_eq!(config.telemetry.max_buffered_events, 10_000);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attentio.json");
        fs::write(&path, "{ capture: ").unwrap();

        let err = MonitorConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid settings"));
    }

    #[test]
    fn presets_differ_only_in_cadence() {
        let lesson = MonitorConfig::lesson();
        let hook = MonitorConfig::telemetry_hook();

        assert_eq!(lesson.capture.interval_ms, 3000);
        assert_eq!(hook.capture.interval_ms, 1500);
        assert_eq!(lesson.alerts, hook.alerts);
    }
}
