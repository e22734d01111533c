//! Event bridge: relays capture events from the background capturer into
//! the audit log.
//!
//! The bridge only translates and forwards. Missing fields get defaults and
//! nothing is rejected or retried.

mod channel;
mod relay;

pub use channel::{EventChannel, NativeCaptureEvent, NATIVE_CAPTURE_EVENT};
pub use relay::{relay_json_lines, ChannelSink, EventSink, JsonLinesSink, SinkError};

use crate::log_store::{new_id, note, now_iso, CaptureLogEntry, LogStore};
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub struct EventBridge {
    channel: Arc<EventChannel>,
    log_store: Arc<LogStore>,
}

impl EventBridge {
    pub fn new(channel: Arc<EventChannel>, log_store: Arc<LogStore>) -> Self {
        Self { channel, log_store }
    }

    /// Listen on [`NATIVE_CAPTURE_EVENT`].
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_to(NATIVE_CAPTURE_EVENT)
    }

    /// Listen on `name` until the returned handle is cancelled or dropped.
    ///
    /// The listener is attached before this returns, so events published
    /// afterwards are not missed.
    pub fn subscribe_to(&self, name: &str) -> Subscription {
        let mut rx = self.channel.subscribe(name);
        let log_store = Arc::clone(&self.log_store);
        let channel_name = name.to_string();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => forward(&log_store, event).await,
                    Err(RecvError::Lagged(missed)) => {
                        log::warn!("[BRIDGE] Listener lagged, {} events lost", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            log::debug!("[BRIDGE] Listener on {} closed", channel_name);
        });

        log::info!("[BRIDGE] Listening on {}", name);
        Subscription { task }
    }
}

/// Handle for one bridge listener. Cancelling or dropping it detaches.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Detach the listener. Consumes the handle, so it can only happen once.
    pub fn cancel(self) {
        drop(self);
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Normalize one event and append it to the log.
pub async fn forward(log_store: &LogStore, event: NativeCaptureEvent) {
    let entry = normalize(event);
    log::debug!("[BRIDGE] Forwarding {} ({:?})", entry.id, entry.note);
    log_store.append(entry).await;
}

/// Fill in defaults for anything the producer left out.
///
/// Empty strings count as missing. Numeric timestamps are epoch millis.
pub fn normalize(event: NativeCaptureEvent) -> CaptureLogEntry {
    let present = |field: Option<String>| field.filter(|s| !s.trim().is_empty());

    CaptureLogEntry {
        id: present(event.id).unwrap_or_else(new_id),
        timestamp: normalize_timestamp(event.timestamp.as_deref()),
        uri: present(event.uri),
        note: Some(present(event.note).unwrap_or_else(|| note::NATIVE_CAPTURE.to_string())),
    }
}

fn normalize_timestamp(raw: Option<&str>) -> String {
    let raw = match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return now_iso(),
    };

    if let Ok(millis) = raw.parse::<i64>() {
        // Producers send 0 when they had no timestamp
        if millis > 0 {
            if let Some(dt) = DateTime::<Utc>::from_timestamp_millis(millis) {
                return dt.to_rfc3339_opts(SecondsFormat::Millis, true);
            }
        }
        return now_iso();
    }

    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        Err(e) => {
            log::debug!("[BRIDGE] Unparseable timestamp {:?} ({}), using now", raw, e);
            now_iso()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_every_missing_field() {
        let entry = normalize(NativeCaptureEvent {
            uri: Some("a.jpg".to_string()),
            ..Default::default()
        });
        assert!(!entry.id.is_empty());
        assert_eq!(entry.uri.as_deref(), Some("a.jpg"));
        assert_eq!(entry.note(), Some(note::NATIVE_CAPTURE));
        assert!(DateTime::parse_from_rfc3339(&entry.timestamp).is_ok());
    }

    #[test]
    fn keeps_provided_fields() {
        let entry = normalize(NativeCaptureEvent {
            id: Some("screencap_1.jpg".to_string()),
            timestamp: Some("1700000000000".to_string()),
            uri: Some("/cache/screencap_1.jpg".to_string()),
            note: Some("captured".to_string()),
        });
        assert_eq!(entry.id, "screencap_1.jpg");
        assert_eq!(entry.timestamp, "2023-11-14T22:13:20.000Z");
        assert_eq!(entry.note(), Some("captured"));
    }

    #[test]
    fn empty_strings_count_as_missing() {
        let entry = normalize(NativeCaptureEvent {
            id: Some(String::new()),
            timestamp: Some(String::new()),
            uri: Some(String::new()),
            note: Some(" ".to_string()),
        });
        assert!(!entry.id.is_empty());
        assert_eq!(entry.uri, None);
        assert_eq!(entry.note(), Some(note::NATIVE_CAPTURE));
    }

    #[test]
    fn rfc3339_timestamps_are_normalized_to_utc() {
        assert_eq!(
            normalize_timestamp(Some("2024-05-01T12:00:00+02:00")),
            "2024-05-01T10:00:00.000Z"
        );
    }

    #[test]
    fn zero_and_garbage_timestamps_fall_back_to_now() {
        let before = Utc::now() - chrono::Duration::seconds(5);
        for raw in ["0", "yesterday"] {
            let ts = normalize_timestamp(Some(raw));
            let parsed = DateTime::parse_from_rfc3339(&ts).unwrap();
            assert!(parsed > before, "{} -> {}", raw, ts);
        }
    }
}
