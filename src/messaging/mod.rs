// Messaging module - Event stream, subscriptions, outbound buffering and routing
pub mod event;
pub mod queue;
pub mod registry;
pub mod router;

pub use event::{ClientEvent, ErrorKind};
pub use queue::{Flushed, OutboundQueue};
pub use registry::{FrameHandler, Subscription, SubscriptionRegistry};
pub use router::{MessageRouter, Routed};
