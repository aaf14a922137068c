/// Reserved frame types handled by the client itself
pub mod frame_types {
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
}

/// Default base delay before the first reconnect attempt (milliseconds)
pub const DEFAULT_RECONNECT_DELAY: u64 = 1000;

/// Upper bound for a single backoff delay (milliseconds)
pub const DEFAULT_MAX_RECONNECT_DELAY: u64 = 30_000;

/// Default number of reconnect attempts before giving up
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 5;

/// Default heartbeat interval (milliseconds)
pub const HEARTBEAT_INTERVAL: u64 = 30_000;

/// Default transport connect timeout (milliseconds)
pub const DEFAULT_TIMEOUT: u64 = 10_000;

/// Max outbound queue size
pub const MAX_PUSH_BUFFER_SIZE: usize = 1000;

/// Capacity of the lifecycle event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// WebSocket close codes
pub const WS_CLOSE_NORMAL: u16 = 1000;
