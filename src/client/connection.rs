use crate::messaging::{Flushed, OutboundQueue};
use crate::types::{ChannelError, Frame, Result};
use crate::websocket::TransportSink;
use futures::SinkExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Writer {
    generation: u64,
    sink: TransportSink,
}

/// Owns the write half of the current transport.
///
/// Every call names the connection generation it belongs to; calls for a
/// generation other than the installed one are refused, so a stale task can
/// never write into a newer connection.
pub struct ConnectionManager {
    writer: Mutex<Option<Writer>>,
    debug: bool,
}

impl ConnectionManager {
    pub fn new(debug: bool) -> Self {
        Self {
            writer: Mutex::new(None),
            debug,
        }
    }

    /// Sets the write sink (called after a successful open). A sink for an
    /// older generation than the installed one is closed instead.
    pub async fn install(&self, generation: u64, sink: TransportSink) -> bool {
        let mut rejected = {
            let mut writer = self.writer.lock().await;
            match writer.as_ref() {
                Some(current) if current.generation > generation => sink,
                _ => {
                    *writer = Some(Writer { generation, sink });
                    return true;
                }
            }
        };
        if let Err(e) = rejected.close().await {
            tracing::debug!("Error closing superseded transport: {}", e);
        }
        false
    }

    /// Sends one frame through the connection of `generation`
    pub async fn send_frame(&self, generation: u64, frame: &Frame) -> Result<()> {
        let text = frame.to_json()?;

        let mut writer = self.writer.lock().await;
        let writer = writer
            .as_mut()
            .filter(|w| w.generation == generation)
            .ok_or(ChannelError::NotConnected)?;

        writer.sink.send(Message::Text(text.into())).await?;
        if self.debug {
            tracing::debug!("Sent frame: type={}, id={:?}", frame.kind, frame.id);
        }
        Ok(())
    }

    /// Drain `queue` into the connection of `generation`. `None` when that
    /// connection is not the installed one.
    pub async fn flush(&self, generation: u64, queue: &OutboundQueue) -> Option<Flushed> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().filter(|w| w.generation == generation)?;

        let flushed = queue.flush(&mut writer.sink).await;
        if self.debug && flushed.sent > 0 {
            tracing::debug!(
                "Flushed {} queued frames ({} remaining)",
                flushed.sent,
                flushed.remaining
            );
        }
        Some(flushed)
    }

    /// Gracefully close the installed transport if it belongs to
    /// `generation` or an older one.
    pub async fn close(&self, generation: u64, code: u16, reason: &str) {
        let writer = {
            let mut writer = self.writer.lock().await;
            match writer.as_ref() {
                Some(current) if current.generation <= generation => writer.take(),
                _ => None,
            }
        };
        let Some(mut writer) = writer else {
            return;
        };

        let close_frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        };
        if let Err(e) = writer.sink.send(Message::Close(Some(close_frame))).await {
            tracing::debug!("Close frame not delivered: {}", e);
        }
        if let Err(e) = writer.sink.close().await {
            tracing::debug!("Error closing transport: {}", e);
        }
    }

    #[cfg(test)]
    async fn is_installed(&self, generation: u64) -> bool {
        self.writer
            .lock()
            .await
            .as_ref()
            .is_some_and(|w| w.generation == generation)
    }
}
