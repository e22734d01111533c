//! Named event channels between capture producers and the bridge.
//!
//! Delivery is at-most-once: an event published while nobody is subscribed
//! is lost, and a subscriber that falls too far behind loses the overflow.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

/// Channel the background capturer publishes completed captures on.
pub const NATIVE_CAPTURE_EVENT: &str = "NativeCaptureEvent";

const DEFAULT_CAPACITY: usize = 64;

/// Raw capture event as emitted by a producer. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCaptureEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Epoch milliseconds or RFC 3339. Numbers are accepted on the wire.
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(f) => (f as i64).to_string(),
    }))
}

pub struct EventChannel {
    senders: Mutex<HashMap<String, broadcast::Sender<NativeCaptureEvent>>>,
    capacity: usize,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, name: &str) -> broadcast::Sender<NativeCaptureEvent> {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        senders
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish on `name`. Returns how many subscribers received it.
    pub fn publish(&self, name: &str, event: NativeCaptureEvent) -> usize {
        match self.sender(name).send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                log::debug!("[BRIDGE] No subscriber on {}, event dropped", name);
                0
            }
        }
    }

    pub fn subscribe(&self, name: &str) -> broadcast::Receiver<NativeCaptureEvent> {
        self.sender(name).subscribe()
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.sender(name).receiver_count()
    }
}
