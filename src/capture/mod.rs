//! Screen capture domain: public API.
//!
//! [`ScreenCapturer`] is the seam the scheduler and the background capturer
//! depend on. [`XcapCapturer`] is the real implementation: grab the primary
//! monitor, optionally crop, encode JPEG, write it to disk and hand back the
//! file path as the artifact reference.

mod region;
mod screenshot;

pub use region::{crop_to_region, encode_jpeg, CropError};
pub use screenshot::{capture_primary_monitor, write_artifact};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Rectangle on the primary display, in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

#[async_trait]
pub trait ScreenCapturer: Send + Sync {
    /// Capture only `region`. Returns an artifact reference.
    async fn capture_region(&self, region: &CaptureRegion) -> Result<String, CaptureError>;

    /// Capture the whole primary display. Returns an artifact reference.
    async fn capture_full_screen(&self) -> Result<String, CaptureError>;
}

pub struct XcapCapturer {
    capture_dir: PathBuf,
    jpeg_quality: u8,
}

impl XcapCapturer {
    pub fn new(capture_dir: impl Into<PathBuf>, jpeg_quality: u8) -> Self {
        Self {
            capture_dir: capture_dir.into(),
            jpeg_quality,
        }
    }

    async fn capture(&self, region: Option<CaptureRegion>) -> Result<String, CaptureError> {
        let dir = self.capture_dir.clone();
        let quality = self.jpeg_quality;

        // xcap and JPEG encoding are blocking
        let path = tokio::task::spawn_blocking(move || {
            let start = std::time::Instant::now();
            let screenshot = capture_primary_monitor()?;
            let capture_ms = start.elapsed().as_millis();

            let image = match region {
                Some(r) => crop_to_region(&screenshot, &r)?,
                None => screenshot,
            };
            let jpeg = encode_jpeg(&image, quality)?;
            let path = write_artifact(&dir, &jpeg)?;

            log::info!(
                "[CAPTURE] {}x{} captured in {}ms, written in {}ms ({} bytes)",
                image.width(),
                image.height(),
                capture_ms,
                start.elapsed().as_millis() - capture_ms,
                jpeg.len()
            );
            Ok::<_, CaptureError>(path)
        })
        .await
        .map_err(|e| CaptureError::TaskFailed(e.to_string()))??;

        Ok(path.to_string_lossy().to_string())
    }
}

#[async_trait]
impl ScreenCapturer for XcapCapturer {
    async fn capture_region(&self, region: &CaptureRegion) -> Result<String, CaptureError> {
        self.capture(Some(*region)).await
    }

    async fn capture_full_screen(&self) -> Result<String, CaptureError> {
        self.capture(None).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Failed to enumerate monitors: {0}")]
    MonitorEnumeration(String),

    #[error("No primary monitor found")]
    NoPrimaryMonitor,

    #[error("Screen capture failed: {0}")]
    CaptureFailed(String),

    #[error(transparent)]
    Crop(#[from] CropError),

    #[error("Failed to write capture: {0}")]
    Write(#[from] std::io::Error),

    #[error("Capture task failed: {0}")]
    TaskFailed(String),
}
