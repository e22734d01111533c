//! Full-screen capture using the `xcap` crate, plus artifact files.
//!
//! This is the infrastructure layer: it talks to the OS and the disk.

use super::CaptureError;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use xcap::Monitor;

/// Captures the primary monitor's screen as a `DynamicImage`.
///
/// Returns the full-screen screenshot including all pixels.
/// The caller is responsible for cropping to a region.
pub fn capture_primary_monitor() -> Result<DynamicImage, CaptureError> {
    let monitors = Monitor::all().map_err(|e| CaptureError::MonitorEnumeration(e.to_string()))?;

    let mut fallback = None;
    let mut primary = None;
    for monitor in monitors {
        if monitor.is_primary().unwrap_or(false) {
            primary = Some(monitor);
            break;
        }
        // If no monitor reports as primary, use the first one
        if fallback.is_none() {
            fallback = Some(monitor);
        }
    }
    let monitor = primary.or(fallback).ok_or(CaptureError::NoPrimaryMonitor)?;

    let image = monitor
        .capture_image()
        .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

    Ok(DynamicImage::ImageRgba8(image))
}

/// Writes an encoded capture into `dir` as `screencap_<millis>.jpg`.
pub fn write_artifact(dir: &Path, jpeg_bytes: &[u8]) -> Result<PathBuf, CaptureError> {
    std::fs::create_dir_all(dir)?;
    let millis = chrono::Utc::now().timestamp_millis();
    let mut path = dir.join(format!("screencap_{}.jpg", millis));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("screencap_{}_{}.jpg", millis, n));
        n += 1;
    }
    std::fs::write(&path, jpeg_bytes)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifacts_never_overwrite_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_artifact(dir.path(), b"one").unwrap();
        let b = write_artifact(dir.path(), b"two").unwrap();
        assert_ne!(a, b);
        assert_eq!(std::fs::read(&a).unwrap(), b"one");
        assert_eq!(std::fs::read(&b).unwrap(), b"two");
        let name = a.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("screencap_") && name.ends_with(".jpg"));
    }
}
