mod factory;

pub use factory::{Transport, TransportLink, TransportSink, TransportStream, WebSocketFactory};
