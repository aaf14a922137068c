use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::client::ConnectionState;

/// Runtime error taxonomy reported on the event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport failed to open or errored while open
    #[serde(rename = "connection_error")]
    Connection,

    /// Inbound frame could not be decoded
    #[serde(rename = "parse_error")]
    Parse,

    /// All reconnect attempts used up
    ReconnectExhausted,

    /// Outbound queue bound exceeded, oldest frame dropped
    QueueOverflow,

    /// No pong within the configured window
    HeartbeatTimeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection_error",
            Self::Parse => "parse_error",
            Self::ReconnectExhausted => "reconnect_exhausted",
            Self::QueueOverflow => "queue_overflow",
            Self::HeartbeatTimeout => "heartbeat_timeout",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle and error notifications emitted by a [`ChannelClient`](crate::ChannelClient)
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Connection state transition
    StateChanged(ConnectionState),

    /// Transport opened and the client is `Connected`
    Open,

    /// Transport closed
    Close {
        code: Option<u16>,
        reason: String,
        /// `true` when the close came from [`ChannelClient::close`](crate::ChannelClient::close)
        requested: bool,
    },

    /// Non-fatal runtime error
    Error { kind: ErrorKind, message: String },

    /// A reconnect attempt has been scheduled
    ReconnectScheduled { attempt: u32, delay: Duration },

    /// Reconnect attempts exhausted; fired once per exhaustion
    ReconnectFailed { attempts: u32 },
}

impl ClientEvent {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_names() {
        assert_eq!(ErrorKind::Connection.as_str(), "connection_error");
        assert_eq!(ErrorKind::Parse.as_str(), "parse_error");
        assert_eq!(ErrorKind::ReconnectExhausted.as_str(), "reconnect_exhausted");
        assert_eq!(ErrorKind::QueueOverflow.as_str(), "queue_overflow");
        assert_eq!(ErrorKind::HeartbeatTimeout.as_str(), "heartbeat_timeout");
    }

    #[test]
    fn test_error_kind_serde_matches_as_str() {
        for kind in [
            ErrorKind::Connection,
            ErrorKind::Parse,
            ErrorKind::ReconnectExhausted,
            ErrorKind::QueueOverflow,
            ErrorKind::HeartbeatTimeout,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_client_event_error_kind() {
        let event = ClientEvent::error(ErrorKind::Parse, "bad frame");
        assert_eq!(event.error_kind(), Some(ErrorKind::Parse));
        assert_eq!(ClientEvent::Open.error_kind(), None);
    }
}
