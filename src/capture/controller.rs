use std::sync::{atomic::AtomicBool, Arc, MutexGuard};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    error::CaptureError,
    inference::InferenceClient,
    models::{Emotion, TickResult},
    settings::CaptureSettings,
};

use super::camera::{Camera, SharedCamera};
use super::loop_worker::{capture_loop, CaptureContext};

/// What the learner-facing overlay shows for the latest tick.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureDisplay {
    pub emotion: Option<Emotion>,
    pub confidence: Option<f64>,
    pub attention: Option<f64>,
    pub face_detected: bool,
    pub error: Option<String>,
    pub is_processing: bool,
}

impl CaptureDisplay {
    pub(crate) fn show(&mut self, tick: &TickResult) {
        *self = Self {
            emotion: Some(tick.emotion.clone()),
            confidence: Some(tick.confidence),
            attention: Some(tick.attention_score),
            face_detected: true,
            error: None,
            is_processing: false,
        };
    }

    pub(crate) fn show_error(&mut self, err: &CaptureError) {
        self.face_detected = false;
        self.error = Some(err.to_string());
        self.is_processing = false;
    }
}

pub(crate) fn lock_camera(
    camera: &SharedCamera,
) -> Result<MutexGuard<'_, Box<dyn Camera>>, CaptureError> {
    camera
        .lock()
        .map_err(|_| CaptureError::DeviceUnavailable("camera lock poisoned".into()))
}

/// Owns the camera and the capture task for one tracking instance.
pub struct CaptureController {
    camera: SharedCamera,
    inference: Arc<dyn InferenceClient>,
    samples: mpsc::Sender<TickResult>,
    display: watch::Sender<CaptureDisplay>,
    tracking: watch::Sender<bool>,
    session_id: watch::Receiver<Option<String>>,
    settings: CaptureSettings,
    in_flight: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl CaptureController {
    pub fn new(
        camera: SharedCamera,
        inference: Arc<dyn InferenceClient>,
        samples: mpsc::Sender<TickResult>,
        session_id: watch::Receiver<Option<String>>,
        settings: CaptureSettings,
    ) -> Self {
        let (display, _) = watch::channel(CaptureDisplay::default());
        let (tracking, _) = watch::channel(false);

        Self {
            camera,
            inference,
            samples,
            display,
            tracking,
            session_id,
            settings,
            in_flight: Arc::new(AtomicBool::new(false)),
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Observers of the tracking on/off transition.
    pub fn subscribe_tracking(&self) -> watch::Receiver<bool> {
        self.tracking.subscribe()
    }

    pub fn subscribe_display(&self) -> watch::Receiver<CaptureDisplay> {
        self.display.subscribe()
    }

    /// Ask for the camera and, once granted, start ticking. Device errors are
    /// returned to the caller and never retried here.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        if self.handle.is_some() {
            return Err(CaptureError::AlreadyActive);
        }

        let camera = Arc::clone(&self.camera);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock_camera(&camera)?;
            guard.open()
        })
        .await
        .map_err(|err| CaptureError::DeviceUnavailable(format!("camera open join failed: {err}")))??;

        // Never show the previous run's result.
        self.display.send_replace(CaptureDisplay::default());

        let cancel_token = CancellationToken::new();
        let ctx = CaptureContext {
            camera: Arc::clone(&self.camera),
            inference: Arc::clone(&self.inference),
            samples: self.samples.clone(),
            display: self.display.clone(),
            session_id: self.session_id.clone(),
            in_flight: Arc::clone(&self.in_flight),
            settings: self.settings.clone(),
        };

        let handle = tokio::spawn(capture_loop(ctx, cancel_token.clone()));
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.tracking.send_replace(true);

        info!(
            "tracking started, capturing every {}ms",
            self.settings.interval_ms
        );
        Ok(())
    }

    /// Stop ticking and release the camera. Returns whether tracking was active.
    ///
    /// An inference call already in flight is abandoned, not awaited.
    pub async fn stop(&mut self) -> Result<bool> {
        let Some(token) = self.cancel_token.take() else {
            return Ok(false);
        };
        token.cancel();
        self.tracking.send_replace(false);

        let joined = match self.handle.take() {
            Some(handle) => handle.await.context("capture loop task failed to join"),
            None => Ok(()),
        };

        self.release_camera();
        self.display.send_replace(CaptureDisplay::default());
        info!("tracking stopped");

        joined.map(|_| true)
    }

    fn release_camera(&self) {
        match lock_camera(&self.camera) {
            Ok(mut camera) => camera.release(),
            Err(err) => warn!("could not release camera: {err}"),
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
            self.tracking.send_replace(false);
            self.release_camera();
        }
    }
}
