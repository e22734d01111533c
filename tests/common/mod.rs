//! Fakes for the capture and upload primitives shared by integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use capture_relay_lib::app::CaptureApp;
use capture_relay_lib::capture::{CaptureError, CaptureRegion, ScreenCapturer};
use capture_relay_lib::config::Config;
use capture_relay_lib::delivery::{UploadError, Uploader};
use capture_relay_lib::log_store::{CaptureLogEntry, LogStore, MemoryKvStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct FakeCapturer {
    pub fail: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
    full_calls: AtomicUsize,
    region_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCapturer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let capturer = Self::default();
        capturer.fail.store(true, Ordering::SeqCst);
        Arc::new(capturer)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        let capturer = Self::default();
        *capturer.delay.lock().unwrap() = Some(delay);
        Arc::new(capturer)
    }

    pub fn calls(&self) -> usize {
        self.full_calls() + self.region_calls()
    }

    pub fn full_calls(&self) -> usize {
        self.full_calls.load(Ordering::SeqCst)
    }

    pub fn region_calls(&self) -> usize {
        self.region_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn capture(&self, counter: &AtomicUsize, kind: &str) -> Result<String, CaptureError> {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(CaptureError::CaptureFailed("permission revoked".to_string()));
        }
        Ok(format!("/captures/{}-{}.jpg", kind, n))
    }
}

#[async_trait]
impl ScreenCapturer for FakeCapturer {
    async fn capture_region(&self, _region: &CaptureRegion) -> Result<String, CaptureError> {
        self.capture(&self.region_calls, "region").await
    }

    async fn capture_full_screen(&self) -> Result<String, CaptureError> {
        self.capture(&self.full_calls, "full").await
    }
}

#[derive(Default)]
pub struct FakeUploader {
    pub fail: AtomicBool,
    pub panic: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl FakeUploader {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let uploader = Self::default();
        uploader.fail.store(true, Ordering::SeqCst);
        Arc::new(uploader)
    }

    pub fn panicking() -> Arc<Self> {
        let uploader = Self::default();
        uploader.panic.store(true, Ordering::SeqCst);
        Arc::new(uploader)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for FakeUploader {
    async fn upload(&self, artifact: &str) -> Result<(), UploadError> {
        self.calls.lock().unwrap().push(artifact.to_string());
        if self.panic.load(Ordering::SeqCst) {
            panic!("uploader blew up");
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(UploadError::Status(500));
        }
        Ok(())
    }
}

pub fn test_config(interval: Duration, retention_limit: usize) -> Config {
    Config {
        capture_interval_ms: interval.as_millis() as u64,
        retention_limit,
        ..Config::default()
    }
}

pub fn build_app(
    interval: Duration,
    retention_limit: usize,
    capturer: Arc<FakeCapturer>,
    uploader: Arc<FakeUploader>,
) -> CaptureApp {
    CaptureApp::new(
        test_config(interval, retention_limit),
        capturer,
        uploader,
        Arc::new(MemoryKvStore::new()),
    )
}

pub fn notes(entries: &[CaptureLogEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|e| e.note.clone().unwrap_or_default())
        .collect()
}

pub fn count_note(entries: &[CaptureLogEntry], note: &str) -> usize {
    entries.iter().filter(|e| e.note() == Some(note)).count()
}

/// Poll until the log holds at least `n` entries or the attempts run out.
pub async fn wait_for_entries(store: &LogStore, n: usize) -> Vec<CaptureLogEntry> {
    for _ in 0..200 {
        let entries = store.read_all().await;
        if entries.len() >= n {
            return entries;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    store.read_all().await
}
