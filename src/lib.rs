//! # STORM Realtime
//!
//! Resilient WebSocket channel client for the STORM pipeline dashboard.
//!
//! A [`ChannelClient`] keeps one JSON-framed WebSocket alive: it reconnects
//! with exponential backoff, pings the peer on an interval, queues
//! outbound frames while disconnected and routes inbound frames to handlers
//! by their `type` tag. Lifecycle changes and runtime errors are published
//! on an event stream.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use storm_realtime::{ChannelClient, ClientEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ChannelClient::builder("ws://localhost:8000/ws/pipeline")
//!         .heartbeat_timeout(Duration::from_secs(10))
//!         .build()?;
//!
//!     let mut events = client.events();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let ClientEvent::Error { kind, message } = event {
//!                 eprintln!("{}: {}", kind, message);
//!             }
//!         }
//!     });
//!
//!     let _status = client.subscribe("pipeline_status", |frame| {
//!         println!("status: {:?}", frame.data);
//!     });
//!
//!     client.connect().await?;
//!     client.send("start_pipeline", &serde_json::json!({"topic": "Rust"})).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod infrastructure;
pub mod messaging;
pub mod registry;
pub mod types;
pub mod websocket;

pub use client::{
    ChannelClient, ChannelClientBuilder, ChannelClientOptions, ConnectionState, Endpoint,
};
pub use messaging::{ClientEvent, ErrorKind, FrameHandler, Subscription};
pub use registry::ConnectionRegistry;
pub use types::{ChannelError, Frame, Result};
pub use websocket::{Transport, TransportLink, WebSocketFactory};
