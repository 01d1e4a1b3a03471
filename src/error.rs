use std::time::Duration;

use thiserror::Error;

/// Failures of the capture side of the pipeline.
///
/// Device errors stop tracking from starting and are surfaced to the learner.
/// Everything else is a per-tick "no signal" condition: the loop keeps
/// ticking and the streak engine never sees the failed tick.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("tracking already active")]
    AlreadyActive,

    #[error("frame capture failed: {0}")]
    Frame(String),

    #[error("inference request failed: {0}")]
    Network(String),

    #[error("no face detected")]
    NoFace,

    #[error("inference rejected frame: {0}")]
    Rejected(String),

    #[error("malformed inference response: {0}")]
    Malformed(String),

    #[error("inference timed out after {0:?}")]
    Timeout(Duration),
}

impl CaptureError {
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            CaptureError::PermissionDenied | CaptureError::DeviceUnavailable(_)
        )
    }
}
