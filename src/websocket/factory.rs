use crate::client::Endpoint;
use crate::types::{ChannelError, Result};
use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt, TryStreamExt};
use std::pin::Pin;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

/// Outgoing half of an open transport
pub type TransportSink = Pin<Box<dyn Sink<Message, Error = ChannelError> + Send>>;

/// Incoming half of an open transport
pub type TransportStream = Pin<Box<dyn Stream<Item = Result<Message>> + Send>>;

/// An open, full-duplex connection
pub struct TransportLink {
    pub sink: TransportSink,
    pub stream: TransportStream,
}

impl TransportLink {
    pub fn new<S, R>(sink: S, stream: R) -> Self
    where
        S: Sink<Message, Error = ChannelError> + Send + 'static,
        R: Stream<Item = Result<Message>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

/// Opens connections to an [`Endpoint`]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, endpoint: &Endpoint) -> Result<TransportLink>;
}

/// WebSocket factory for creating WebSocket connections
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketFactory;

impl WebSocketFactory {
    /// Open a WebSocket connection, announcing the endpoint's sub-protocols
    pub async fn create(endpoint: &Endpoint) -> Result<TransportLink> {
        let mut request = endpoint.url().as_str().into_client_request()?;

        if !endpoint.protocols().is_empty() {
            let protocols = HeaderValue::from_str(&endpoint.protocols().join(", "))
                .map_err(|e| ChannelError::InvalidEndpoint(format!("sub-protocol: {}", e)))?;
            request
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", protocols);
        }

        tracing::debug!("Creating WebSocket connection to: {}", endpoint.url());

        let connect = tokio_tungstenite::connect_async(request);
        let (ws_stream, _response) = match endpoint.options().connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| ChannelError::Timeout)??,
            None => connect.await?,
        };

        let (write_half, read_half) = ws_stream.split();
        Ok(TransportLink::new(
            write_half.sink_map_err(ChannelError::from),
            read_half.map_err(ChannelError::from),
        ))
    }
}

#[async_trait]
impl Transport for WebSocketFactory {
    async fn open(&self, endpoint: &Endpoint) -> Result<TransportLink> {
        Self::create(endpoint).await
    }
}
