//! Background capturer and the session that runs it out of process.
//!
//! The background capturer keeps capturing on its own schedule regardless of
//! what the foreground scheduler is doing. Each artifact it writes is
//! announced as a [`NativeCaptureEvent`] on an [`EventSink`]. When it runs as
//! a child process (`--background`) the sink is its stdout, and the
//! foreground [`BackgroundSession`] relays those lines into the event channel.

use crate::bridge::{
    relay_json_lines, EventChannel, EventSink, JsonLinesSink, NativeCaptureEvent,
    NATIVE_CAPTURE_EVENT,
};
use crate::capture::{ScreenCapturer, XcapCapturer};
use crate::config::Config;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Command-line flag that switches the binary into background-capturer mode.
pub const BACKGROUND_FLAG: &str = "--background";

const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct BackgroundCapturer {
    capturer: Arc<dyn ScreenCapturer>,
    sink: Arc<dyn EventSink>,
    interval: Duration,
}

impl BackgroundCapturer {
    pub fn new(capturer: Arc<dyn ScreenCapturer>, sink: Arc<dyn EventSink>, interval: Duration) -> Self {
        Self {
            capturer,
            sink,
            interval,
        }
    }

    /// Capture every `interval`, starting immediately.
    ///
    /// Returns only when the sink fails, i.e. nobody is listening any more.
    pub async fn run(&self) -> Result<(), crate::bridge::SinkError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match self.capturer.capture_full_screen().await {
                Ok(uri) => {
                    let event = capture_event(&uri);
                    log::info!("[BACKGROUND] Captured {}", uri);
                    if let Err(e) = self.sink.emit(event).await {
                        log::error!("[BACKGROUND] Event sink closed: {}", e);
                        return Err(e);
                    }
                }
                Err(e) => log::warn!("[BACKGROUND] Capture failed: {}", e),
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<(), crate::bridge::SinkError>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// Completion event for a freshly written artifact.
///
/// `note` stays unset so the bridge tags it `native_capture`; `captured` is
/// reserved for scheduler entries that have a queued delivery.
fn capture_event(uri: &str) -> NativeCaptureEvent {
    let id = Path::new(uri)
        .file_name()
        .map(|name| name.to_string_lossy().to_string());
    NativeCaptureEvent {
        id,
        timestamp: Some(chrono::Utc::now().timestamp_millis().to_string()),
        uri: Some(uri.to_string()),
        note: None,
    }
}

/// Entry point for `--background`: capture and print events to stdout.
pub async fn run_standalone(config: Config) -> Result<(), crate::bridge::SinkError> {
    log::info!(
        "[BACKGROUND] Capturer started, interval={}ms, dir={}",
        config.capture_interval_ms,
        config.capture_dir().display()
    );
    let capturer = Arc::new(XcapCapturer::new(config.capture_dir(), config.jpeg_quality));
    let sink = Arc::new(JsonLinesSink::new(tokio::io::stdout()));
    BackgroundCapturer::new(capturer, sink, config.capture_interval())
        .run()
        .await
}

struct RunningChild {
    child: Child,
    relay: JoinHandle<usize>,
}

/// Owns the background capturer child process while a capture session is
/// granted. Starting and stopping are both idempotent.
pub struct BackgroundSession {
    channel: Arc<EventChannel>,
    running: Mutex<Option<RunningChild>>,
}

impl BackgroundSession {
    pub fn new(channel: Arc<EventChannel>) -> Self {
        Self {
            channel,
            running: Mutex::new(None),
        }
    }

    /// Spawn `program args...` and relay its stdout onto the event channel.
    pub fn start(&self, program: &Path, args: &[&str]) -> Result<(), SessionError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            log::debug!("[BACKGROUND] Session already running");
            return Ok(());
        }

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child.stdout.take().ok_or(SessionError::NoStdout)?;

        let channel = Arc::clone(&self.channel);
        let relay = tokio::spawn(async move {
            relay_json_lines(stdout, &channel, NATIVE_CAPTURE_EVENT).await
        });

        log::info!(
            "[BACKGROUND] Session started: {} (pid {:?})",
            program.display(),
            child.id()
        );
        *running = Some(RunningChild { child, relay });
        Ok(())
    }

    /// Kill the child and wait for the relay to drain.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(RunningChild { mut child, mut relay }) = running else {
            return;
        };

        if let Err(e) = child.kill().await {
            log::warn!("[BACKGROUND] Failed to kill capturer: {}", e);
        }
        match tokio::time::timeout(RELAY_DRAIN_TIMEOUT, &mut relay).await {
            Ok(Ok(forwarded)) => {
                log::info!("[BACKGROUND] Session stopped, {} events relayed", forwarded)
            }
            Ok(Err(e)) => log::warn!("[BACKGROUND] Relay task failed: {}", e),
            Err(_) => {
                // Something else still holds the pipe open
                relay.abort();
                log::warn!("[BACKGROUND] Relay did not drain in time, aborted");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to spawn background capturer: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Background capturer has no stdout")]
    NoStdout,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::normalize;
    use crate::log_store::note;

    #[test]
    fn capture_event_uses_file_name_as_id() {
        let event = capture_event("/cache/screencap_42.jpg");
        assert_eq!(event.id.as_deref(), Some("screencap_42.jpg"));
        assert_eq!(event.uri.as_deref(), Some("/cache/screencap_42.jpg"));
        assert!(event.timestamp.clone().unwrap().parse::<i64>().unwrap() > 0);

        // Logged as a native capture, never as a foreground `captured`
        assert_eq!(event.note, None);
        let entry = normalize(event);
        assert_eq!(entry.note(), Some(note::NATIVE_CAPTURE));
    }

    #[tokio::test]
    async fn stdout_sink_accepts_events() {
        let sink = JsonLinesSink::new(tokio::io::stdout());
        sink.emit(NativeCaptureEvent::default()).await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let session = BackgroundSession::new(Arc::new(EventChannel::new()));
        session.stop().await;
        assert!(!session.is_running());
    }
}
