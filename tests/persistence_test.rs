//! The audit log survives a restart when backed by the file store.

use capture_relay_lib::log_store::{note, CaptureLogEntry, FileKvStore, LogStore, LOG_KEY};
use std::sync::Arc;

#[tokio::test]
async fn log_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = LogStore::new(Arc::new(FileKvStore::new(dir.path())));
        store
            .append(CaptureLogEntry::new("a", Some("/c/a.jpg".into()), note::CAPTURED))
            .await;
        store.append(CaptureLogEntry::status(note::UPLOAD_FLUSHED)).await;
    }

    let reopened = LogStore::new(Arc::new(FileKvStore::new(dir.path())));
    let entries = reopened.read_all().await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].note(), Some(note::UPLOAD_FLUSHED));
    assert_eq!(entries[1].id, "a");
}

#[tokio::test]
async fn corrupted_slot_reads_empty_and_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(format!("{}.json", LOG_KEY)), "{not json").unwrap();

    let store = LogStore::new(Arc::new(FileKvStore::new(dir.path())));
    assert!(store.read_all().await.is_empty());

    store.append(CaptureLogEntry::status(note::UPLOAD_FLUSHED)).await;
    let entries = store.read_all().await;
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn clear_removes_the_slot() {
    let dir = tempfile::tempdir().unwrap();
    let store = LogStore::new(Arc::new(FileKvStore::new(dir.path())));
    store.append(CaptureLogEntry::status(note::UPLOAD_FLUSHED)).await;

    store.clear().await;

    assert!(store.read_all().await.is_empty());
    assert!(!dir.path().join(format!("{}.json", LOG_KEY)).exists());
}
