use super::{ChannelClientBuilder, ClientState, ConnectionManager, ConnectionState, Endpoint};
use crate::infrastructure::{self, HeartbeatLink, HeartbeatManager, ReconnectPolicy};
use crate::messaging::{
    ClientEvent, ErrorKind, FrameHandler, MessageRouter, OutboundQueue, Routed, Subscription,
    SubscriptionRegistry,
};
use crate::types::{ChannelError, EVENT_CHANNEL_CAPACITY, Frame, Result, WS_CLOSE_NORMAL};
use crate::websocket::{Transport, TransportLink, TransportStream};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite::Message;

/// Why an established connection went away
struct CloseCause {
    code: Option<u16>,
    reason: String,
    error: Option<(ErrorKind, String)>,
}

impl CloseCause {
    fn lost(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            error: None,
        }
    }

    fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code: None,
            reason: message.clone(),
            error: Some((kind, message)),
        }
    }
}

pub(crate) struct ClientInner {
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    connection: ConnectionManager,
    state: Mutex<ClientState>,
    status: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ClientEvent>,
    registry: SubscriptionRegistry,
    queue: OutboundQueue,
    router: MessageRouter,
}

/// Resilient client for one logical WebSocket channel.
///
/// `ChannelClient` keeps a single connection to its endpoint alive: it
/// reconnects with exponential backoff after unexpected closes, sends
/// `ping` frames on an interval, buffers frames sent while disconnected and
/// dispatches inbound frames to handlers by their `type` tag.
///
/// The client is cheaply cloneable; all clones share the same connection.
///
/// # Example
///
/// ```no_run
/// use storm_realtime::ChannelClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ChannelClient::new("wss://storm.example.com/ws/pipeline")?;
///
/// let _progress = client.subscribe("article_progress", |frame| {
///     println!("progress: {:?}", frame.data);
/// });
///
/// client.connect().await?;
/// client.send("start_pipeline", &serde_json::json!({"topic": "Rust"})).await?;
/// client.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChannelClient {
    inner: Arc<ClientInner>,
}

impl ChannelClient {
    /// Client for `url` with default options and the WebSocket transport
    pub fn new(url: impl Into<String>) -> Result<Self> {
        ChannelClientBuilder::new(url).build()
    }

    pub fn builder(url: impl Into<String>) -> ChannelClientBuilder {
        ChannelClientBuilder::new(url)
    }

    pub(crate) fn from_parts(endpoint: Endpoint, transport: Arc<dyn Transport>) -> Self {
        let options = endpoint.options();
        let policy = ReconnectPolicy::new(
            options.reconnect_delay,
            options.max_reconnect_delay,
            options.max_retry_attempts,
        );
        let registry = SubscriptionRegistry::new();
        let (status, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let inner = ClientInner {
            connection: ConnectionManager::new(options.debug),
            state: Mutex::new(ClientState::new(policy)),
            status,
            events,
            router: MessageRouter::new(registry.clone(), options.debug),
            registry,
            queue: OutboundQueue::new(options.max_queue_size),
            transport,
            endpoint,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Establishes the connection.
    ///
    /// Returns immediately if already connected. If a connect or reconnect is
    /// already underway, waits for its outcome instead of starting another.
    ///
    /// On success the heartbeat starts and every frame queued while
    /// disconnected is transmitted in order. A failed first attempt is handed
    /// to the reconnection policy when `retry_initial_connect` is set; the
    /// call then resolves once the client is connected or rejects once the
    /// attempts are exhausted.
    ///
    /// # Errors
    ///
    /// - the transport error, when the first attempt fails and retries are off
    /// - [`ChannelError::ReconnectExhausted`] when every retry failed
    /// - [`ChannelError::Closed`] when [`close()`](Self::close) interrupted it
    pub async fn connect(&self) -> Result<()> {
        let generation = {
            let mut state = self.inner.state.lock();
            match self.inner.current() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting | ConnectionState::Reconnecting => None,
                ConnectionState::Disconnected | ConnectionState::Failed => {
                    state.cancel_reconnect();
                    state.policy.reset();
                    state.last_error = None;
                    state.teardown();
                    self.inner.set_state(ConnectionState::Connecting);
                    Some(state.generation)
                }
            }
        };

        let Some(generation) = generation else {
            return self.wait_for_outcome().await;
        };

        match self.inner.open(generation).await {
            Ok(()) => Ok(()),
            Err(ChannelError::Closed) => Err(ChannelError::Closed),
            Err(e) => {
                let retry = self.inner.endpoint.options().retry_initial_connect;
                if self.inner.handle_failure(generation, &e, retry) {
                    self.wait_for_outcome().await
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn wait_for_outcome(&self) -> Result<()> {
        let mut status = self.inner.status.subscribe();
        loop {
            let current = *status.borrow_and_update();
            match current {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected => return Err(ChannelError::Closed),
                ConnectionState::Failed => return Err(self.inner.failure()),
                ConnectionState::Connecting | ConnectionState::Reconnecting => {}
            }
            if status.changed().await.is_err() {
                return Err(ChannelError::Closed);
            }
        }
    }

    /// Shuts the client down.
    ///
    /// Cancels a pending reconnect, stops the heartbeat and read tasks, clears
    /// the outbound queue and every subscription, then sends a normal-closure
    /// (1000) close frame. All timers are cancelled before the first await,
    /// so no callback fires against the client once this is called. Safe to
    /// call any number of times; a closed client can be connected again.
    pub async fn close(&self) {
        let torn_down = {
            let mut state = self.inner.state.lock();
            let was = self.inner.current();

            state.cancel_reconnect();
            let previous = state.teardown();
            self.inner.queue.clear();
            self.inner.registry.clear();
            self.inner.set_state(ConnectionState::Disconnected);

            if was != ConnectionState::Disconnected {
                tracing::info!("Disconnecting from {}", self.inner.endpoint.url());
                self.inner.emit(ClientEvent::Close {
                    code: Some(WS_CLOSE_NORMAL),
                    reason: "client closed".to_string(),
                    requested: true,
                });
            }
            previous
        };

        self.inner
            .connection
            .close(torn_down, WS_CLOSE_NORMAL, "client closed")
            .await;
    }

    /// Sends a frame of type `kind` with `data` as payload.
    ///
    /// While connected the frame goes out right away, behind anything already
    /// queued. Otherwise it is queued until the next successful connect;
    /// being disconnected is not an error.
    ///
    /// # Errors
    ///
    /// Only if `data` cannot be serialized to JSON.
    pub async fn send<T>(&self, kind: &str, data: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let data = serde_json::to_value(data)?;
        self.send_frame(Frame::new(kind, Some(data))).await;
        Ok(())
    }

    /// Sends a prebuilt frame, e.g. one carrying a correlation id
    pub async fn send_frame(&self, frame: Frame) {
        if self.inner.debug() {
            tracing::debug!("Queueing frame: type={}, id={:?}", frame.kind, frame.id);
        }

        if let Some(evicted) = self.inner.queue.enqueue(frame) {
            tracing::warn!(
                "Outbound queue full, dropped oldest frame of type {}",
                evicted.kind
            );
            self.inner.emit(ClientEvent::error(
                ErrorKind::QueueOverflow,
                format!("dropped oldest queued frame of type '{}'", evicted.kind),
            ));
        }

        let generation = {
            let state = self.inner.state.lock();
            (self.inner.current() == ConnectionState::Connected).then_some(state.generation)
        };
        if let Some(generation) = generation {
            self.inner.flush(generation).await;
        }
    }

    /// Registers `handler` for inbound frames of type `kind`.
    ///
    /// Handlers run in registration order on the client's read task and must
    /// not block. The returned [`Subscription`] removes exactly this handler.
    pub fn subscribe<F>(&self, kind: &str, handler: F) -> Subscription
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(kind, Arc::new(handler))
    }

    /// Registers a shared handler; registering the same `Arc` twice for one
    /// type keeps a single entry.
    pub fn subscribe_handler(&self, kind: &str, handler: FrameHandler) -> Subscription {
        self.inner.registry.subscribe(kind, handler)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.current()
    }

    /// Receiver that observes every state transition
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.status.subscribe()
    }

    /// Stream of lifecycle and error events from this point on
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Reconnect attempts made since the last successful connect
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.state.lock().policy.attempts()
    }

    /// Frames waiting in the outbound queue
    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }
}

impl ClientInner {
    fn debug(&self) -> bool {
        self.endpoint.options().debug
    }

    fn current(&self) -> ConnectionState {
        *self.status.borrow()
    }

    // Callers hold the state lock, so transitions are serialized.
    fn set_state(&self, next: ConnectionState) {
        let previous = self.status.send_replace(next);
        if previous != next {
            if self.debug() {
                tracing::debug!("Connection state {} -> {}", previous, next);
            }
            self.emit(ClientEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: ClientEvent) {
        // Err only means nobody is listening
        let _ = self.events.send(event);
    }

    fn failure(&self) -> ChannelError {
        let state = self.state.lock();
        if state.policy.is_exhausted() {
            ChannelError::ReconnectExhausted {
                attempts: state.policy.attempts(),
            }
        } else {
            ChannelError::Connection(
                state
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "connection failed".to_string()),
            )
        }
    }

    /// Open the transport for `generation` and, if that generation is still
    /// current, make it the live connection.
    async fn open(self: &Arc<Self>, generation: u64) -> Result<()> {
        tracing::info!("Connecting to {}", self.endpoint.url());
        let TransportLink { sink, stream } = self.transport.open(&self.endpoint).await?;

        if !self.connection.install(generation, sink).await {
            return Err(ChannelError::Closed);
        }

        let activated = {
            let mut state = self.state.lock();
            if state.generation == generation {
                self.activate(&mut state, generation, stream);
                true
            } else {
                false
            }
        };
        if !activated {
            self.connection
                .close(generation, WS_CLOSE_NORMAL, "superseded")
                .await;
            return Err(ChannelError::Closed);
        }

        tracing::info!("Connected to {}", self.endpoint.url());
        self.emit(ClientEvent::Open);
        self.flush(generation).await;
        Ok(())
    }

    fn activate(self: &Arc<Self>, state: &mut ClientState, generation: u64, stream: TransportStream) {
        state.policy.reset();
        state.last_error = None;
        state.tasks.abort_all();

        let weak = Arc::downgrade(self);
        state.tasks.spawn(read_loop(weak.clone(), generation, stream));

        let options = self.endpoint.options();
        if options.heartbeat_enabled() {
            let (monitor, notifier) = HeartbeatManager::new(options.heartbeat_interval);
            let monitor = monitor
                .with_timeout(options.heartbeat_timeout)
                .with_debug(options.debug);
            state.pong_notifier = Some(notifier);
            state.tasks.spawn(monitor.run(ConnectionHeartbeat {
                inner: weak,
                generation,
            }));
        }

        self.set_state(ConnectionState::Connected);
    }

    async fn flush(self: &Arc<Self>, generation: u64) {
        let Some(flushed) = self.connection.flush(generation, &self.queue).await else {
            return;
        };
        if let Some(error) = flushed.error {
            tracing::error!(
                "Transmit failed with {} frames still queued: {}",
                flushed.remaining,
                error
            );
            self.handle_unexpected_close(
                generation,
                CloseCause::failed(ErrorKind::Connection, error),
            );
        }
    }

    /// Write a control frame straight to the transport, bypassing the queue
    async fn transmit(self: &Arc<Self>, generation: u64, frame: Frame) -> bool {
        match self.connection.send_frame(generation, &frame).await {
            Ok(()) => true,
            Err(ChannelError::NotConnected) => false,
            Err(e) => {
                tracing::error!("Failed to send {} frame: {}", frame.kind, e);
                self.handle_unexpected_close(
                    generation,
                    CloseCause::failed(ErrorKind::Connection, e.to_string()),
                );
                false
            }
        }
    }

    async fn handle_text(self: &Arc<Self>, generation: u64, text: &str) {
        if self.debug() {
            tracing::debug!("Received text frame: {}", text);
        }

        match self.router.route(text) {
            Routed::Invalid { error } => {
                self.emit(ClientEvent::error(ErrorKind::Parse, error));
            }
            Routed::Pong { id } => {
                let state = self.state.lock();
                if state.generation == generation
                    && let Some(notifier) = &state.pong_notifier
                {
                    notifier.notify(id);
                }
            }
            Routed::Ping { id } => {
                self.transmit(generation, Frame::pong(id)).await;
            }
            Routed::Dispatched { .. } => {}
        }
    }

    /// The live connection of `generation` closed without being asked to.
    /// Tears it down and hands over to the reconnection policy.
    fn handle_unexpected_close(self: &Arc<Self>, generation: u64, cause: CloseCause) {
        let torn_down = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            let previous = state.teardown();

            tracing::warn!("Connection lost: {}", cause.reason);
            if let Some((kind, message)) = cause.error {
                self.emit(ClientEvent::error(kind, message));
            }
            self.emit(ClientEvent::Close {
                code: cause.code,
                reason: cause.reason,
                requested: false,
            });

            self.schedule_reconnect(&mut state);
            previous
        };

        // Release the dead transport without holding up the caller
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            if let Some(inner) = weak.upgrade() {
                inner
                    .connection
                    .close(torn_down, WS_CLOSE_NORMAL, "connection lost")
                    .await;
            }
        });
    }

    /// An attempt for `generation` failed before the connection went live.
    /// Returns `true` if another attempt was scheduled.
    fn handle_failure(self: &Arc<Self>, generation: u64, error: &ChannelError, retry: bool) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }

        tracing::error!("Connection attempt failed: {}", error);
        state.last_error = Some(error.to_string());
        self.emit(ClientEvent::error(ErrorKind::Connection, error.to_string()));

        if retry {
            self.schedule_reconnect(&mut state)
        } else {
            self.set_state(ConnectionState::Failed);
            false
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, state: &mut ClientState) -> bool {
        if state.reconnect_pending() {
            return true;
        }

        let Some((attempt, delay)) = state.policy.next_attempt() else {
            let attempts = state.policy.attempts();
            tracing::error!("Giving up after {} reconnect attempts", attempts);
            self.set_state(ConnectionState::Failed);
            self.emit(ClientEvent::error(
                ErrorKind::ReconnectExhausted,
                format!("no connection after {} reconnect attempts", attempts),
            ));
            self.emit(ClientEvent::ReconnectFailed { attempts });
            return false;
        };

        tracing::info!(
            "Reconnect attempt {}/{} in {:?}",
            attempt,
            state.policy.max_attempts(),
            delay
        );
        self.set_state(ConnectionState::Reconnecting);
        self.emit(ClientEvent::ReconnectScheduled { attempt, delay });

        let weak = Arc::downgrade(self);
        let generation = state.generation;
        state.reconnect_timer = Some(infrastructure::schedule(delay, async move {
            if let Some(inner) = weak.upgrade() {
                inner.reconnect(generation).await;
            }
        }));
        true
    }

    async fn reconnect(self: &Arc<Self>, generation: u64) {
        let current = {
            let mut state = self.state.lock();
            if state.generation == generation {
                // Fired; clearing the slot must not abort this very task
                if let Some(timer) = state.reconnect_timer.take() {
                    timer.detach();
                }
                true
            } else {
                false
            }
        };
        if !current {
            return;
        }

        tracing::info!("Attempting to reconnect...");
        match self.open(generation).await {
            Ok(()) => tracing::info!("Reconnected successfully"),
            Err(ChannelError::Closed) => tracing::debug!("Reconnect superseded"),
            Err(e) => {
                self.handle_failure(generation, &e, true);
            }
        }
    }
}

async fn read_loop(inner: Weak<ClientInner>, generation: u64, mut stream: TransportStream) {
    tracing::debug!("Starting read task");

    let cause = loop {
        let Some(item) = stream.next().await else {
            break CloseCause::lost(None, "transport stream ended");
        };
        let Some(client) = inner.upgrade() else {
            return;
        };

        match item {
            Ok(Message::Text(text)) => client.handle_text(generation, text.as_str()).await,
            Ok(Message::Binary(data)) => {
                tracing::warn!("Received unexpected binary message ({} bytes)", data.len());
            }
            Ok(Message::Close(Some(frame))) => {
                tracing::warn!(
                    "Server closed connection: code={}, reason='{}'",
                    u16::from(frame.code),
                    frame.reason.as_str()
                );
                break CloseCause::lost(Some(u16::from(frame.code)), frame.reason.as_str());
            }
            Ok(Message::Close(None)) => {
                tracing::warn!("Server closed connection without close frame");
                break CloseCause::lost(None, "closed without close frame");
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(e) => {
                tracing::error!("WebSocket read error: {}", e);
                break CloseCause::failed(ErrorKind::Connection, e.to_string());
            }
        }
    };

    if let Some(client) = inner.upgrade() {
        client.handle_unexpected_close(generation, cause);
    }
    tracing::debug!("Read task finished");
}

/// Heartbeat view of one connection generation
struct ConnectionHeartbeat {
    inner: Weak<ClientInner>,
    generation: u64,
}

#[async_trait]
impl HeartbeatLink for ConnectionHeartbeat {
    async fn send_ping(&self, ping: Frame) -> bool {
        match self.inner.upgrade() {
            Some(inner) => inner.transmit(self.generation, ping).await,
            None => false,
        }
    }

    async fn heartbeat_timeout(&self, waited: Duration) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_unexpected_close(
                self.generation,
                CloseCause::failed(
                    ErrorKind::HeartbeatTimeout,
                    format!("no pong within {:?}", waited),
                ),
            );
        }
    }
}
