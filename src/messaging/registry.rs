use crate::types::Frame;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

/// Handler for inbound frames of one type tag
pub type FrameHandler = Arc<dyn Fn(&Frame) + Send + Sync>;

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    // tag -> handlers in registration order
    tags: HashMap<String, Vec<(u64, FrameHandler)>>,
}

/// Maps a frame type tag to the handlers interested in it.
///
/// Dispatch runs over a snapshot of the handler list, so handlers may
/// subscribe or unsubscribe while a dispatch pass is in progress.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

/// Handle returned by [`SubscriptionRegistry::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    kind: String,
    id: u64,
    registry: Weak<Mutex<RegistryInner>>,
}

impl Subscription {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Remove exactly the handler this subscription was created for.
    ///
    /// Returns `false` if it was already gone (e.g. the registry was cleared).
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(inner) => remove(&inner, &self.kind, self.id),
            None => false,
        }
    }
}

fn remove(inner: &Mutex<RegistryInner>, kind: &str, id: u64) -> bool {
    let mut inner = inner.lock();
    let Some(handlers) = inner.tags.get_mut(kind) else {
        return false;
    };
    let before = handlers.len();
    handlers.retain(|(handler_id, _)| *handler_id != id);
    let removed = handlers.len() != before;
    if handlers.is_empty() {
        inner.tags.remove(kind);
    }
    removed
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `kind`.
    ///
    /// Registering the same `Arc` twice for one tag keeps a single entry and
    /// returns a handle to it.
    pub fn subscribe(&self, kind: &str, handler: FrameHandler) -> Subscription {
        let mut inner = self.inner.lock();

        let existing = inner.tags.get(kind).and_then(|handlers| {
            handlers
                .iter()
                .find(|(_, h)| Arc::ptr_eq(h, &handler))
                .map(|(id, _)| *id)
        });

        let id = match existing {
            Some(id) => id,
            None => {
                inner.next_id += 1;
                let id = inner.next_id;
                inner
                    .tags
                    .entry(kind.to_string())
                    .or_default()
                    .push((id, handler));
                id
            }
        };

        Subscription {
            kind: kind.to_string(),
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every handler registered for the frame's type, in registration
    /// order. A panicking handler is logged and skipped. Returns the number of
    /// handlers that ran to completion.
    pub fn dispatch(&self, frame: &Frame) -> usize {
        let snapshot: Vec<FrameHandler> = {
            let inner = self.inner.lock();
            match inner.tags.get(&frame.kind) {
                Some(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return 0,
            }
        };

        let mut completed = 0;
        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(frame))) {
                Ok(()) => completed += 1,
                Err(_) => {
                    tracing::error!("Handler for frame type '{}' panicked", frame.kind);
                }
            }
        }
        completed
    }

    pub fn handler_count(&self, kind: &str) -> usize {
        self.inner.lock().tags.get(kind).map_or(0, Vec::len)
    }

    pub fn tags(&self) -> Vec<String> {
        self.inner.lock().tags.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().tags.is_empty()
    }

    /// Drop every tag and handler in one step
    pub fn clear(&self) {
        self.inner.lock().tags.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> FrameHandler {
        let log = Arc::clone(log);
        Arc::new(move |_frame: &Frame| log.lock().push(name))
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.subscribe("msg", recorder(&log, "h1"));
        registry.subscribe("msg", recorder(&log, "h2"));
        registry.subscribe("other", recorder(&log, "h3"));

        let ran = registry.dispatch(&Frame::new("msg", None));

        assert_eq!(ran, 2);
        assert_eq!(*log.lock(), vec!["h1", "h2"]);
    }

    #[test]
    fn test_subscribe_same_handler_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handler: FrameHandler = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.subscribe("msg", Arc::clone(&handler));
        registry.subscribe("msg", Arc::clone(&handler));
        assert_eq!(registry.handler_count("msg"), 1);

        registry.dispatch(&Frame::new("msg", None));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_handler() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = registry.subscribe("msg", recorder(&log, "h1"));
        registry.subscribe("msg", recorder(&log, "h2"));

        assert!(first.unsubscribe());
        registry.dispatch(&Frame::new("msg", None));

        assert_eq!(*log.lock(), vec!["h2"]);
    }

    #[test]
    fn test_last_unsubscribe_removes_tag() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let sub = registry.subscribe("msg", recorder(&log, "h1"));
        assert_eq!(registry.tags(), vec!["msg".to_string()]);

        sub.unsubscribe();
        assert!(registry.is_empty());
        assert_eq!(registry.handler_count("msg"), 0);
    }

    #[test]
    fn test_unsubscribe_after_clear_returns_false() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sub = registry.subscribe("msg", recorder(&log, "h1"));

        registry.clear();

        assert!(!sub.unsubscribe());
    }

    #[test]
    fn test_panicking_handler_does_not_stop_others() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.subscribe("msg", Arc::new(|_: &Frame| panic!("boom")));
        registry.subscribe("msg", recorder(&log, "after"));

        let ran = registry.dispatch(&Frame::new("msg", None));

        assert_eq!(ran, 1);
        assert_eq!(*log.lock(), vec!["after"]);
    }

    #[test]
    fn test_handler_may_unsubscribe_during_dispatch() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let slot_for_handler = Arc::clone(&slot);
        let log_for_handler = Arc::clone(&log);
        let sub = registry.subscribe(
            "msg",
            Arc::new(move |_: &Frame| {
                log_for_handler.lock().push("once");
                if let Some(sub) = slot_for_handler.lock().take() {
                    sub.unsubscribe();
                }
            }),
        );
        *slot.lock() = Some(sub);
        registry.subscribe("msg", recorder(&log, "steady"));

        registry.dispatch(&Frame::new("msg", None));
        registry.dispatch(&Frame::new("msg", None));

        assert_eq!(*log.lock(), vec!["once", "steady", "steady"]);
    }

    #[test]
    fn test_handler_may_subscribe_during_dispatch() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_registry = registry.clone();
        let inner_log = Arc::clone(&log);
        registry.subscribe(
            "msg",
            Arc::new(move |_: &Frame| {
                inner_registry.subscribe("late", recorder(&inner_log, "late"));
            }),
        );

        registry.dispatch(&Frame::new("msg", None));
        registry.dispatch(&Frame::new("late", None));

        assert_eq!(*log.lock(), vec!["late"]);
    }
}
