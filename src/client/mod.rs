// Module declarations
mod builder;
mod connection;
mod core;
mod state;

// Public API exports
pub use builder::{ChannelClientBuilder, ChannelClientOptions, Endpoint, env_keys};
pub use connection::{ConnectionManager, ConnectionState};
pub use core::ChannelClient;
pub use state::ClientState;
