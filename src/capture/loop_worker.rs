use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    error::CaptureError,
    inference::InferenceClient,
    models::TickResult,
    settings::CaptureSettings,
};

use super::attention::normalize;
use super::camera::{encode_frame, SharedCamera};
use super::controller::{lock_camera, CaptureDisplay};

// Set to false to silence per-tick logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Everything a running capture loop needs. Built by `CaptureController::start`.
pub struct CaptureContext {
    pub camera: SharedCamera,
    pub inference: Arc<dyn InferenceClient>,
    pub samples: mpsc::Sender<TickResult>,
    pub display: watch::Sender<CaptureDisplay>,
    pub session_id: watch::Receiver<Option<String>>,
    pub in_flight: Arc<AtomicBool>,
    pub settings: CaptureSettings,
}

pub async fn capture_loop(ctx: CaptureContext, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(ctx.settings.interval());
    // A slow tick drops the ticks it overlapped instead of bursting to catch up.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let timeout = ctx.settings.inference_timeout();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if ctx.in_flight.swap(true, Ordering::AcqRel) {
                    log_debug!("previous inference still in flight, skipping tick");
                    continue;
                }
                ctx.display.send_modify(|display| display.is_processing = true);

                let started = Instant::now();
                let session_id = ctx.session_id.borrow().clone();
                let outcome = tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        ctx.in_flight.store(false, Ordering::Release);
                        log_debug!("tracking stopped mid-tick, abandoning inference call");
                        break;
                    }
                    result = tokio::time::timeout(timeout, perform_tick(&ctx, session_id.as_deref())) => {
                        result.unwrap_or(Err(CaptureError::Timeout(timeout)))
                    }
                };
                ctx.in_flight.store(false, Ordering::Release);

                // The tick and stop() may have finished together.
                if cancel_token.is_cancelled() {
                    log_debug!("tracking stopped during tick, discarding result");
                    break;
                }

                match outcome {
                    Ok(tick) => {
                        log_debug!(
                            "tick: emotion={} confidence={:.2} attention={:.2} faces={} ({}ms)",
                            tick.emotion,
                            tick.confidence,
                            tick.attention_score,
                            tick.face_count,
                            started.elapsed().as_millis()
                        );
                        ctx.display.send_modify(|display| display.show(&tick));
                        // The receiver may be the one calling stop(); never block it.
                        tokio::select! {
                            sent = ctx.samples.send(tick) => {
                                if sent.is_err() {
                                    log_warn!("sample receiver dropped, stopping capture loop");
                                    break;
                                }
                            }
                            _ = cancel_token.cancelled() => break,
                        }
                    }
                    Err(err) => {
                        if err.is_device_error() {
                            log_error!("camera failed mid-run, still ticking: {err}");
                        } else {
                            log_warn!("tick produced no signal after {}ms: {err}", started.elapsed().as_millis());
                        }
                        ctx.display.send_modify(|display| display.show_error(&err));
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("capture loop shutting down");
                break;
            }
        }
    }
}

async fn perform_tick(
    ctx: &CaptureContext,
    session_id: Option<&str>,
) -> Result<TickResult, CaptureError> {
    let camera = Arc::clone(&ctx.camera);
    let max_width = ctx.settings.max_frame_width;
    let quality = ctx.settings.jpeg_quality;

    let frame = tokio::task::spawn_blocking(move || {
        let image = lock_camera(&camera)?.grab()?;
        encode_frame(&image, max_width, quality)
    })
    .await
    .map_err(|err| CaptureError::Frame(format!("capture worker join failed: {err}")))??;

    let response = ctx.inference.infer(&frame, session_id).await?;
    normalize(response, frame.captured_at)
}
