//! Audit log of capture and delivery events.
//!
//! A single persisted slot holds a JSON array of entries, most recent first,
//! capped at [`MAX_LOG_ENTRIES`]. The log is best-effort: storage failures are
//! logged and swallowed, and a corrupted slot reads back as empty.

mod kv;

pub use kv::{FileKvStore, KvStore, MemoryKvStore, StoreError};

use crate::error::NonFatal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Name of the persisted slot.
pub const LOG_KEY: &str = "capture_logs_v1";

/// Oldest entries beyond this count are dropped on append.
pub const MAX_LOG_ENTRIES: usize = 1000;

/// Status tags written into [`CaptureLogEntry::note`].
pub mod note {
    pub const CAPTURED: &str = "captured";
    pub const UPLOAD_FLUSHED: &str = "upload_flushed";
    pub const UPLOAD_FAILED: &str = "upload_failed";
    pub const NATIVE_CAPTURE: &str = "native_capture";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureLogEntry {
    pub id: String,
    /// ISO-8601, UTC.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CaptureLogEntry {
    pub fn new(id: impl Into<String>, uri: Option<String>, note: &str) -> Self {
        Self {
            id: id.into(),
            timestamp: now_iso(),
            uri,
            note: Some(note.to_string()),
        }
    }

    /// A status entry with a fresh id and no artifact.
    pub fn status(note: &str) -> Self {
        Self::new(new_id(), None, note)
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }
}

/// Fresh opaque id for entries and queued deliveries.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time as an ISO-8601 string with millisecond precision.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub struct LogStore {
    kv: Arc<dyn KvStore>,
    // Serializes read-modify-write so concurrent appends never drop each other.
    writer: Mutex<()>,
}

impl LogStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            writer: Mutex::new(()),
        }
    }

    /// In-memory store, mostly for tests.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    /// Prepend an entry, keeping at most [`MAX_LOG_ENTRIES`]. Never fails.
    pub async fn append(&self, entry: CaptureLogEntry) {
        let _guard = self.writer.lock().await;
        let note = entry.note.clone().unwrap_or_default();
        if self.try_append(entry).await.non_fatal("LOG_STORE").is_some() {
            log::debug!("[LOG_STORE] Appended {}", note);
        }
    }

    /// All entries, most recent first. Empty on any storage problem.
    pub async fn read_all(&self) -> Vec<CaptureLogEntry> {
        match self.kv.get(LOG_KEY).await {
            Ok(Some(raw)) => parse_entries(&raw).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("[LOG_STORE] Read failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Remove every entry. Best-effort.
    pub async fn clear(&self) {
        let _guard = self.writer.lock().await;
        if self.kv.remove(LOG_KEY).await.non_fatal("LOG_STORE").is_some() {
            log::info!("[LOG_STORE] Cleared");
        }
    }

    async fn try_append(&self, entry: CaptureLogEntry) -> Result<(), StoreError> {
        let mut entries = match self.kv.get(LOG_KEY).await? {
            // A corrupted slot is replaced rather than blocking the log forever
            Some(raw) => parse_entries(&raw).unwrap_or_default(),
            None => Vec::new(),
        };
        entries.insert(0, entry);
        entries.truncate(MAX_LOG_ENTRIES);
        let raw = serde_json::to_string(&entries)?;
        self.kv.set(LOG_KEY, raw).await
    }
}

fn parse_entries(raw: &str) -> Option<Vec<CaptureLogEntry>> {
    match serde_json::from_str(raw) {
        Ok(entries) => Some(entries),
        Err(e) => {
            log::warn!("[LOG_STORE] Ignoring corrupted log slot: {}", e);
            None
        }
    }
}
