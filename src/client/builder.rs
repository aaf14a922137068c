use super::ChannelClient;
use crate::types::{
    ChannelError, DEFAULT_MAX_RECONNECT_DELAY, DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_RECONNECT_DELAY,
    DEFAULT_TIMEOUT, HEARTBEAT_INTERVAL, MAX_PUSH_BUFFER_SIZE, Result,
};
use crate::websocket::{Transport, WebSocketFactory};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Environment variables read by [`ChannelClientOptions::from_env`]
pub mod env_keys {
    pub const URL: &str = "STORM_WS_URL";
    pub const PROTOCOLS: &str = "STORM_WS_PROTOCOLS";
    pub const RECONNECT_DELAY_MS: &str = "STORM_WS_RECONNECT_DELAY_MS";
    pub const MAX_RECONNECT_DELAY_MS: &str = "STORM_WS_MAX_RECONNECT_DELAY_MS";
    pub const MAX_RETRY_ATTEMPTS: &str = "STORM_WS_MAX_RETRY_ATTEMPTS";
    pub const HEARTBEAT_INTERVAL_MS: &str = "STORM_WS_HEARTBEAT_INTERVAL_MS";
    pub const HEARTBEAT_TIMEOUT_MS: &str = "STORM_WS_HEARTBEAT_TIMEOUT_MS";
    pub const MAX_QUEUE_SIZE: &str = "STORM_WS_MAX_QUEUE_SIZE";
    pub const DEBUG: &str = "STORM_WS_DEBUG";
}

#[derive(Debug, Clone)]
pub struct ChannelClientOptions {
    /// Base delay for the first reconnect attempt; doubles per attempt
    pub reconnect_delay: Duration,
    /// Cap for a single backoff delay
    pub max_reconnect_delay: Duration,
    pub max_retry_attempts: u32,
    /// Zero disables the heartbeat
    pub heartbeat_interval: Duration,
    /// `None` disables dead-connection detection
    pub heartbeat_timeout: Option<Duration>,
    /// `None` leaves the outbound queue unbounded
    pub max_queue_size: Option<usize>,
    pub connect_timeout: Option<Duration>,
    /// Hand a failed first `connect()` to the reconnection policy
    pub retry_initial_connect: bool,
    /// Frame-level tracing; no behavioral effect
    pub debug: bool,
}

impl Default for ChannelClientOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY),
            max_reconnect_delay: Duration::from_millis(DEFAULT_MAX_RECONNECT_DELAY),
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            heartbeat_interval: Duration::from_millis(HEARTBEAT_INTERVAL),
            heartbeat_timeout: None,
            max_queue_size: Some(MAX_PUSH_BUFFER_SIZE),
            connect_timeout: Some(Duration::from_millis(DEFAULT_TIMEOUT)),
            retry_initial_connect: true,
            debug: false,
        }
    }
}

impl ChannelClientOptions {
    /// Options from `STORM_WS_*` environment variables, defaults for the rest
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Options from an arbitrary key lookup, defaults for missing keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, env_keys::RECONNECT_DELAY_MS)? {
            options.reconnect_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, env_keys::MAX_RECONNECT_DELAY_MS)? {
            options.max_reconnect_delay = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var(&lookup, env_keys::MAX_RETRY_ATTEMPTS)? {
            options.max_retry_attempts = n;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, env_keys::HEARTBEAT_INTERVAL_MS)? {
            options.heartbeat_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, env_keys::HEARTBEAT_TIMEOUT_MS)? {
            options.heartbeat_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(size) = parse_var::<usize, _>(&lookup, env_keys::MAX_QUEUE_SIZE)? {
            options.max_queue_size = (size > 0).then_some(size);
        }
        if let Some(debug) = parse_var(&lookup, env_keys::DEBUG)? {
            options.debug = debug;
        }

        Ok(options)
    }

    pub fn heartbeat_enabled(&self) -> bool {
        !self.heartbeat_interval.is_zero()
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ChannelError::Config(format!("{}={:?}: {}", key, raw, e))),
        _ => Ok(None),
    }
}

/// Immutable connection target: URL, sub-protocols and options
#[derive(Debug, Clone)]
pub struct Endpoint {
    url: Url,
    protocols: Vec<String>,
    options: ChannelClientOptions,
}

impl Endpoint {
    /// Validate the URL (`ws://` or `wss://`) and bundle it with its options
    pub fn new(
        url: &str,
        protocols: Vec<String>,
        mut options: ChannelClientOptions,
    ) -> Result<Self> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ChannelError::InvalidEndpoint(format!(
                "unsupported scheme '{}', expected ws or wss",
                url.scheme()
            )));
        }
        if let Some(bad) = protocols.iter().find(|p| p.is_empty() || p.contains([',', ' '])) {
            return Err(ChannelError::InvalidEndpoint(format!(
                "invalid sub-protocol '{}'",
                bad
            )));
        }

        // A zero bound would evict every frame on arrival
        options.max_queue_size = options.max_queue_size.filter(|&n| n > 0);

        Ok(Self {
            url,
            protocols,
            options,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }

    pub fn options(&self) -> &ChannelClientOptions {
        &self.options
    }
}

/// Builder for [`ChannelClient`]
pub struct ChannelClientBuilder {
    url: String,
    protocols: Vec<String>,
    options: ChannelClientOptions,
    transport: Option<Arc<dyn Transport>>,
}

impl ChannelClientBuilder {
    /// Create a new builder
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocols: Vec::new(),
            options: ChannelClientOptions::default(),
            transport: None,
        }
    }

    /// Builder from `STORM_WS_URL`, `STORM_WS_PROTOCOLS` and the option variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builder from an arbitrary key lookup; the URL key is required
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(env_keys::URL)
            .ok_or_else(|| ChannelError::Config(format!("{} must be set", env_keys::URL)))?;
        let protocols: Vec<String> = lookup(env_keys::PROTOCOLS)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self::new(url)
            .protocols(protocols)
            .options(ChannelClientOptions::from_lookup(lookup)?))
    }

    pub fn options(mut self, options: ChannelClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.options.reconnect_delay = delay;
        self
    }

    pub fn max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.options.max_reconnect_delay = delay;
        self
    }

    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.options.max_retry_attempts = attempts;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.options.heartbeat_interval = interval;
        self
    }

    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.options.heartbeat_timeout = Some(timeout);
        self
    }

    /// `None` or `Some(0)` leaves the queue unbounded
    pub fn max_queue_size(mut self, size: Option<usize>) -> Self {
        self.options.max_queue_size = size.filter(|&n| n > 0);
        self
    }

    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    pub fn retry_initial_connect(mut self, retry: bool) -> Self {
        self.options.retry_initial_connect = retry;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.options.debug = debug;
        self
    }

    /// Replace the default WebSocket transport
    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Validate the endpoint and build the client. Nothing is spawned until
    /// [`ChannelClient::connect`] is called.
    pub fn build(self) -> Result<ChannelClient> {
        let endpoint = Endpoint::new(&self.url, self.protocols, self.options)?;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WebSocketFactory));
        Ok(ChannelClient::from_parts(endpoint, transport))
    }
}
