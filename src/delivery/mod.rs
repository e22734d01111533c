//! Bounded delivery queue with per-item retry accounting.
//!
//! Capacity wins over delivery: when the queue is full the oldest item is
//! evicted whatever its state. Each failed upload bumps the item's attempt
//! counter; once it passes [`MAX_DELIVERY_ATTEMPTS`] the item is dropped.
//! Nothing here survives a restart.

mod upload;

pub use upload::{HttpUploader, UploadError, Uploader};

use std::collections::VecDeque;

/// An item is dropped once `attempts` exceeds this.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedDelivery {
    pub id: String,
    /// Artifact reference handed to the uploader (file path or data URI).
    pub uri: String,
    pub attempts: u32,
}

impl QueuedDelivery {
    pub fn new(id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            attempts: 0,
        }
    }
}

/// Outcome counts for one flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    /// Failed this pass but still eligible for retry.
    pub retained: usize,
    /// Failed past the attempt ceiling and removed.
    pub dropped: usize,
}

pub struct DeliveryQueue {
    items: VecDeque<QueuedDelivery>,
    retention_limit: usize,
}

impl DeliveryQueue {
    pub fn new(retention_limit: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(retention_limit),
            retention_limit,
        }
    }

    pub fn retention_limit(&self) -> usize {
        self.retention_limit
    }

    /// Append with a fresh attempt count, evicting from the front if full.
    pub fn enqueue(&mut self, mut item: QueuedDelivery) {
        item.attempts = 0;
        self.items.push_back(item);
        while self.items.len() > self.retention_limit {
            if let Some(evicted) = self.items.pop_front() {
                log::warn!(
                    "[QUEUE] Retention limit {} reached, evicted {} (attempts={})",
                    self.retention_limit,
                    evicted.id,
                    evicted.attempts
                );
            }
        }
    }

    /// Try every queued item once, in order.
    ///
    /// Delivered items are removed. Failed items keep their position for the
    /// next pass unless they have now failed more than
    /// [`MAX_DELIVERY_ATTEMPTS`] times, in which case they are dropped.
    pub async fn flush(&mut self, uploader: &dyn Uploader) -> FlushReport {
        let mut report = FlushReport::default();
        let mut i = 0;

        while i < self.items.len() {
            let uri = self.items[i].uri.clone();
            match uploader.upload(&uri).await {
                Ok(()) => {
                    if let Some(item) = self.items.remove(i) {
                        log::info!("[QUEUE] Delivered {}", item.id);
                    }
                    report.delivered += 1;
                }
                Err(e) => {
                    let item = &mut self.items[i];
                    item.attempts += 1;
                    if item.attempts > MAX_DELIVERY_ATTEMPTS {
                        log::warn!(
                            "[QUEUE] Dropping {} after {} failed attempts: {}",
                            item.id,
                            item.attempts,
                            e
                        );
                        self.items.remove(i);
                        report.dropped += 1;
                    } else {
                        log::info!(
                            "[QUEUE] Upload of {} failed (attempt {}): {}",
                            item.id,
                            item.attempts,
                            e
                        );
                        report.retained += 1;
                        i += 1;
                    }
                }
            }
        }

        report
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Snapshot of the queue, oldest first.
    pub fn items(&self) -> Vec<QueuedDelivery> {
        self.items.iter().cloned().collect()
    }
}
