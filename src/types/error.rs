use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors returned by the channel client.
///
/// Failures that happen inside background tasks (read loop, heartbeat,
/// reconnect timer) are never returned through this type; they are reported
/// as [`ClientEvent::Error`](crate::ClientEvent::Error) instead.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// WebSocket protocol error (handshake failed, invalid frame, etc.)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// General connection error with descriptive message
    #[error("Connection error: {0}")]
    Connection(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing error (malformed endpoint URL)
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Endpoint parsed but is not usable (wrong scheme, bad sub-protocol)
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Invalid configuration value (e.g. from environment variables)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation needs an open transport for the current connection
    #[error("Not connected")]
    NotConnected,

    /// Transport did not open within the configured connect timeout
    #[error("Timeout error")]
    Timeout,

    /// Every reconnect attempt failed
    #[error("Reconnect attempts exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// The client was closed while the operation was in flight
    #[error("Client closed")]
    Closed,
}

/// Convenience type alias for `Result<T, ChannelError>`.
pub type Result<T> = std::result::Result<T, ChannelError>;
