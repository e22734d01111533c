//! Cross-process transport for capture events.
//!
//! The background capturer writes one JSON event per line to its stdout; the
//! foreground reads those lines and republishes them on the in-process
//! [`EventChannel`]. There is no acknowledgment and no replay.

use super::channel::{EventChannel, NativeCaptureEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Where a capture producer sends its completion events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: NativeCaptureEvent) -> Result<(), SinkError>;
}

/// Publishes straight onto an in-process channel.
pub struct ChannelSink {
    channel: Arc<EventChannel>,
    name: String,
}

impl ChannelSink {
    pub fn new(channel: Arc<EventChannel>, name: impl Into<String>) -> Self {
        Self {
            channel,
            name: name.into(),
        }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: NativeCaptureEvent) -> Result<(), SinkError> {
        self.channel.publish(&self.name, event);
        Ok(())
    }
}

/// Writes newline-delimited JSON, one event per line.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> EventSink for JsonLinesSink<W> {
    async fn emit(&self, event: NativeCaptureEvent) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Forward JSON-lines events from `reader` onto `channel` until EOF.
///
/// Malformed lines are logged and skipped. Returns how many events were
/// forwarded.
pub async fn relay_json_lines<R>(reader: R, channel: &EventChannel, name: &str) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut forwarded = 0;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<NativeCaptureEvent>(line) {
                    Ok(event) => {
                        channel.publish(name, event);
                        forwarded += 1;
                    }
                    Err(e) => {
                        log::warn!(
                            "[BRIDGE] Skipping malformed event line ({}): {}",
                            e,
                            line.chars().take(120).collect::<String>()
                        );
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                log::warn!("[BRIDGE] Relay read failed: {}", e);
                break;
            }
        }
    }

    log::info!("[BRIDGE] Relay closed after {} events", forwarded);
    forwarded
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to write event: {0}")]
    Write(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::NATIVE_CAPTURE_EVENT;

    #[tokio::test]
    async fn relays_valid_lines_and_skips_garbage() {
        let channel = EventChannel::new();
        let mut rx = channel.subscribe(NATIVE_CAPTURE_EVENT);
        let input = b"{\"uri\":\"a.jpg\"}\nnot json\n\n{\"id\":\"b\",\"note\":\"captured\"}\n";

        let forwarded = relay_json_lines(&input[..], &channel, NATIVE_CAPTURE_EVENT).await;
        assert_eq!(forwarded, 2);

        assert_eq!(rx.recv().await.unwrap().uri.as_deref(), Some("a.jpg"));
        assert_eq!(rx.recv().await.unwrap().id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn json_lines_sink_output_relays_back() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.emit(NativeCaptureEvent {
            id: Some("screencap_1.jpg".to_string()),
            timestamp: Some("1700000000000".to_string()),
            uri: Some("/tmp/screencap_1.jpg".to_string()),
            note: Some("captured".to_string()),
        })
        .await
        .unwrap();
        sink.emit(NativeCaptureEvent::default()).await.unwrap();

        let written = sink.into_inner();
        assert_eq!(written.iter().filter(|b| **b == b'\n').count(), 2);

        let channel = EventChannel::new();
        let mut rx = channel.subscribe(NATIVE_CAPTURE_EVENT);
        let forwarded = relay_json_lines(&written[..], &channel, NATIVE_CAPTURE_EVENT).await;
        assert_eq!(forwarded, 2);
        assert_eq!(rx.recv().await.unwrap().id.as_deref(), Some("screencap_1.jpg"));
        assert_eq!(rx.recv().await.unwrap(), NativeCaptureEvent::default());
    }
}
