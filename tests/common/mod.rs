#![allow(dead_code)]

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use storm_realtime::client::Endpoint;
use storm_realtime::{
    ChannelClient, ChannelClientBuilder, ChannelError, ClientEvent, Frame, Transport,
    TransportLink,
};
use tokio::sync::{broadcast, mpsc as tokio_mpsc};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

pub const URL: &str = "ws://localhost:8000/ws/pipeline";

#[derive(Default)]
struct MockState {
    refuse_next: usize,
    refuse_all: bool,
    attempts: Vec<Instant>,
}

/// In-memory transport. Every accepted open hands the server side of the
/// connection to the paired [`MockServer`].
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    accepted: tokio_mpsc::UnboundedSender<ServerConn>,
}

pub struct MockServer {
    connections: tokio_mpsc::UnboundedReceiver<ServerConn>,
}

/// Server end of one mock connection. Dropping it ends the client's stream.
pub struct ServerConn {
    from_client: mpsc::UnboundedReceiver<Message>,
    to_client: mpsc::UnboundedSender<storm_realtime::Result<Message>>,
}

pub fn mock() -> (MockTransport, MockServer) {
    let (tx, rx) = tokio_mpsc::unbounded_channel();
    let transport = MockTransport {
        state: Arc::new(Mutex::new(MockState::default())),
        accepted: tx,
    };
    (transport, MockServer { connections: rx })
}

/// Builder wired to `transport`, with a short backoff and no heartbeat
pub fn builder(transport: &MockTransport) -> ChannelClientBuilder {
    ChannelClient::builder(URL)
        .transport(transport.clone())
        .reconnect_delay(Duration::from_millis(50))
        .heartbeat_interval(Duration::ZERO)
}

impl MockTransport {
    pub fn refuse_next(&self, count: usize) {
        self.state.lock().refuse_next = count;
    }

    pub fn refuse_all(&self) {
        self.state.lock().refuse_all = true;
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.state.lock().attempts.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _endpoint: &Endpoint) -> storm_realtime::Result<TransportLink> {
        {
            let mut state = self.state.lock();
            state.attempts.push(Instant::now());
            if state.refuse_all {
                return Err(ChannelError::Connection("connection refused".to_string()));
            }
            if state.refuse_next > 0 {
                state.refuse_next -= 1;
                return Err(ChannelError::Connection("connection refused".to_string()));
            }
        }

        let (client_tx, server_rx) = mpsc::unbounded::<Message>();
        let (server_tx, client_rx) = mpsc::unbounded::<storm_realtime::Result<Message>>();

        let sink = client_tx.sink_map_err(|e| ChannelError::Connection(e.to_string()));
        let conn = ServerConn {
            from_client: server_rx,
            to_client: server_tx,
        };
        if self.accepted.send(conn).is_err() {
            return Err(ChannelError::Connection("server gone".to_string()));
        }
        Ok(TransportLink::new(sink, client_rx))
    }
}

impl MockServer {
    pub async fn accept(&mut self) -> ServerConn {
        self.connections
            .recv()
            .await
            .expect("transport dropped before a connection was opened")
    }
}

impl ServerConn {
    pub fn send_text(&self, text: &str) {
        let _ = self.to_client.unbounded_send(Ok(Message::Text(text.into())));
    }

    pub fn send_frame(&self, frame: &Frame) {
        self.send_text(&frame.to_json().unwrap());
    }

    pub fn send_close(&self, code: u16, reason: &str) {
        use tokio_tungstenite::tungstenite::protocol::CloseFrame;
        use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        };
        let _ = self.to_client.unbounded_send(Ok(Message::Close(Some(frame))));
    }

    pub async fn next_message(&mut self) -> Option<Message> {
        self.from_client.next().await
    }

    /// Next JSON frame written by the client
    pub async fn next_frame(&mut self) -> Frame {
        loop {
            match self.from_client.next().await {
                Some(Message::Text(text)) => return Frame::parse(text.as_str()).unwrap(),
                Some(_) => continue,
                None => panic!("client closed the transport"),
            }
        }
    }
}

/// Wait for the first event matching `pred`, failing after a minute of
/// (virtual) time.
pub async fn wait_for_event<F>(events: &mut broadcast::Receiver<ClientEvent>, pred: F) -> ClientEvent
where
    F: Fn(&ClientEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Everything already published on `events`
pub fn drain(events: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}
