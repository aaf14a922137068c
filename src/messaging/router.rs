use super::registry::SubscriptionRegistry;
use crate::types::Frame;

/// What the router did with an inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// Delivered to `handlers` subscribers of `kind`
    Dispatched { kind: String, handlers: usize },
    /// Heartbeat reply, for the heartbeat monitor
    Pong { id: Option<String> },
    /// Liveness check from the peer, to be answered with a pong
    Ping { id: Option<String> },
    /// Frame could not be decoded and was dropped
    Invalid { error: String },
}

/// Routes incoming frames to the heartbeat monitor or the subscription registry
#[derive(Clone)]
pub struct MessageRouter {
    registry: SubscriptionRegistry,
    debug: bool,
}

impl MessageRouter {
    pub fn new(registry: SubscriptionRegistry, debug: bool) -> Self {
        Self { registry, debug }
    }

    /// Routes a raw text frame to the appropriate handler(s)
    pub fn route(&self, text: &str) -> Routed {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to parse frame: {} - Raw: {}", e, text);
                return Routed::Invalid {
                    error: e.to_string(),
                };
            }
        };

        if frame.is_pong() {
            return Routed::Pong { id: frame.id };
        }
        if frame.is_ping() {
            return Routed::Ping { id: frame.id };
        }

        self.route_to_handlers(frame)
    }

    fn route_to_handlers(&self, frame: Frame) -> Routed {
        if self.debug {
            tracing::debug!(
                "Routing frame: type={}, id={:?}, data={}",
                frame.kind,
                frame.id,
                frame
                    .data
                    .as_ref()
                    .map(|d| d.to_string())
                    .unwrap_or_default()
            );
        }

        let handlers = self.registry.dispatch(&frame);
        if handlers == 0 && self.debug {
            tracing::debug!("No handlers registered for frame type {}", frame.kind);
        }

        Routed::Dispatched {
            kind: frame.kind,
            handlers,
        }
    }
}
