//! Composition root. Builds every component once and wires them together.
//!
//! The log store and the delivery queue are plain instances owned here and
//! handed to the scheduler and the bridge by `Arc`.

use crate::background::{BackgroundSession, SessionError, BACKGROUND_FLAG};
use crate::bridge::{EventBridge, EventChannel, SinkError};
use crate::capture::{ScreenCapturer, XcapCapturer};
use crate::config::{Config, ConfigError};
use crate::delivery::{DeliveryQueue, HttpUploader, UploadError, Uploader};
use crate::error::NonFatal;
use crate::log_store::{FileKvStore, KvStore, LogStore};
use crate::scheduler::{CaptureCycle, CaptureScheduler};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct CaptureApp {
    pub config: Config,
    pub log_store: Arc<LogStore>,
    pub queue: Arc<Mutex<DeliveryQueue>>,
    pub scheduler: CaptureScheduler,
    pub channel: Arc<EventChannel>,
    pub bridge: EventBridge,
    pub background: BackgroundSession,
}

impl CaptureApp {
    /// Wire the app around explicit primitives. Used directly by tests.
    pub fn new(
        config: Config,
        capturer: Arc<dyn ScreenCapturer>,
        uploader: Arc<dyn Uploader>,
        kv: Arc<dyn KvStore>,
    ) -> Self {
        let log_store = Arc::new(LogStore::new(kv));
        let queue = Arc::new(Mutex::new(DeliveryQueue::new(config.retention_limit)));
        let channel = Arc::new(EventChannel::new());

        let cycle = CaptureCycle::new(
            capturer,
            uploader,
            Arc::clone(&queue),
            Arc::clone(&log_store),
        );
        let scheduler = CaptureScheduler::new(cycle, config.capture_interval());
        let bridge = EventBridge::new(Arc::clone(&channel), Arc::clone(&log_store));
        let background = BackgroundSession::new(Arc::clone(&channel));

        Self {
            config,
            log_store,
            queue,
            scheduler,
            channel,
            bridge,
            background,
        }
    }

    /// Production wiring: xcap capture, HTTP upload, file-backed log.
    pub fn from_config(config: Config) -> Result<Self, AppError> {
        let capturer = Arc::new(XcapCapturer::new(config.capture_dir(), config.jpeg_quality));
        let uploader = Arc::new(HttpUploader::from_config(&config)?);
        let kv = Arc::new(FileKvStore::new(config.store_dir()));
        Ok(Self::new(config, capturer, uploader, kv))
    }

    /// Entry counts per note, for the shutdown summary.
    pub async fn log_summary(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.log_store.read_all().await {
            *counts.entry(entry.note.unwrap_or_default()).or_insert(0) += 1;
        }
        counts
    }
}

/// Foreground mode: schedule captures and relay background events until
/// Ctrl-C.
pub async fn run_foreground(config: Config) -> Result<(), AppError> {
    log::info!(
        "[APP] Uploading to {} every {}ms (retention {})",
        config.upload_endpoint,
        config.capture_interval_ms,
        config.retention_limit
    );
    let app = CaptureApp::from_config(config)?;
    let subscription = app.bridge.subscribe();

    if app.config.background_capture {
        let exe = std::env::current_exe()?;
        app.background
            .start(&exe, &[BACKGROUND_FLAG])
            .non_fatal("BACKGROUND");
    }

    if app.config.auto_start {
        app.scheduler.start().await;
    } else {
        log::info!("[APP] Auto-start disabled, scheduler idle");
    }

    tokio::signal::ctrl_c().await?;
    log::info!("[APP] Shutting down");

    app.scheduler.stop();
    app.background.stop().await;
    subscription.cancel();

    for (note, count) in app.log_summary().await {
        log::info!("[APP] {:>16}: {}", note, count);
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
