use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use chrono::Utc;
use image::{codecs::jpeg::JpegEncoder, DynamicImage};

use crate::{error::CaptureError, inference::EncodedFrame};

/// A frame source. The capture loop is the only owner for its lifetime.
pub trait Camera: Send {
    /// Acquire the device. This is the permission request.
    fn open(&mut self) -> Result<(), CaptureError>;

    fn grab(&mut self) -> Result<DynamicImage, CaptureError>;

    /// Stop all tracks. Must be idempotent.
    fn release(&mut self);

    fn is_open(&self) -> bool;
}

pub type SharedCamera = Arc<Mutex<Box<dyn Camera>>>;

pub fn shared(camera: Box<dyn Camera>) -> SharedCamera {
    Arc::new(Mutex::new(camera))
}

const FRAME_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Replays still frames from a directory in file-name order, wrapping around.
/// Used by kiosks that receive frames from an external grabber, and by the CLI.
pub struct DirectoryCamera {
    dir: PathBuf,
    frames: Vec<PathBuf>,
    cursor: usize,
}

impl DirectoryCamera {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            frames: Vec::new(),
            cursor: 0,
        }
    }

    fn scan(dir: &Path) -> Result<Vec<PathBuf>, CaptureError> {
        let entries = std::fs::read_dir(dir).map_err(|err| match err.kind() {
            ErrorKind::PermissionDenied => CaptureError::PermissionDenied,
            _ => CaptureError::DeviceUnavailable(format!("{}: {err}", dir.display())),
        })?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        frames.sort();
        Ok(frames)
    }
}

impl Camera for DirectoryCamera {
    fn open(&mut self) -> Result<(), CaptureError> {
        let frames = Self::scan(&self.dir)?;
        if frames.is_empty() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "no frames in {}",
                self.dir.display()
            )));
        }
        self.frames = frames;
        self.cursor = 0;
        Ok(())
    }

    fn grab(&mut self) -> Result<DynamicImage, CaptureError> {
        if self.frames.is_empty() {
            return Err(CaptureError::DeviceUnavailable("camera not open".into()));
        }
        let path = &self.frames[self.cursor % self.frames.len()];
        self.cursor = (self.cursor + 1) % self.frames.len();
        image::open(path).map_err(|err| CaptureError::Frame(format!("{}: {err}", path.display())))
    }

    fn release(&mut self) {
        self.frames.clear();
        self.cursor = 0;
    }

    fn is_open(&self) -> bool {
        !self.frames.is_empty()
    }
}

/// Downscale to `max_width` (keeping aspect ratio) and JPEG-encode.
pub fn encode_frame(
    image: &DynamicImage,
    max_width: u32,
    quality: u8,
) -> Result<EncodedFrame, CaptureError> {
    let scaled = if max_width > 0 && image.width() > max_width {
        let height = (u64::from(image.height()) * u64::from(max_width) / u64::from(image.width()))
            .max(1) as u32;
        image.thumbnail(max_width, height)
    } else {
        image.clone()
    };
    let rgb = scaled.to_rgb8();

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|err| CaptureError::Frame(format!("jpeg encode failed: {err}")))?;

    Ok(EncodedFrame {
        bytes,
        mime: "image/jpeg",
        width: rgb.width(),
        height: rgb.height(),
        captured_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn encode_downscales_wide_frames() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(1280, 720, Rgb([120, 80, 40])));

        let frame = encode_frame(&image, 640, 80).unwrap();

        assert_eq!(frame.width, 640);
        assert_eq!(frame.height, 360);
        assert_eq!(&frame.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn directory_camera_cycles_frames() {
        let dir = tempfile::tempdir().unwrap();
        for (name, shade) in [("b.png", 10u8), ("a.png", 200u8)] {
            RgbImage::from_pixel(4, 4, Rgb([shade, shade, shade]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut camera = DirectoryCamera::new(dir.path());
        camera.open().unwrap();

        let first = camera.grab().unwrap().to_rgb8();
        let second = camera.grab().unwrap().to_rgb8();
        let third = camera.grab().unwrap().to_rgb8();

        assert_eq!(first.get_pixel(0, 0), &Rgb([200, 200, 200]));
        assert_eq!(second.get_pixel(0, 0), &Rgb([10, 10, 10]));
        assert_eq!(third.get_pixel(0, 0), first.get_pixel(0, 0));

        camera.release();
        assert!(!camera.is_open());
        assert!(camera.grab().is_err());
    }

    #[test]
    fn empty_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut camera = DirectoryCamera::new(dir.path());

        let err = camera.open().unwrap_err();
        assert!(err.is_device_error());
    }
}
