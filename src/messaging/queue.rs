use crate::types::Frame;
use futures::{Sink, SinkExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Display;
use tokio_tungstenite::tungstenite::Message;

#[derive(Default)]
struct QueueInner {
    next_seq: u64,
    frames: VecDeque<(u64, Frame)>,
}

/// Result of one [`OutboundQueue::flush`] pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Flushed {
    pub sent: usize,
    pub remaining: usize,
    /// Transport error that stopped the pass early
    pub error: Option<String>,
}

impl Flushed {
    pub fn interrupted(&self) -> bool {
        self.error.is_some()
    }
}

/// FIFO buffer for frames that could not be transmitted yet.
///
/// A frame is removed only after the sink accepted it. With a capacity set,
/// enqueueing past the bound evicts the oldest frame.
pub struct OutboundQueue {
    inner: Mutex<QueueInner>,
    capacity: Option<usize>,
}

impl OutboundQueue {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            capacity,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Append to the tail. Returns the frame evicted to stay within capacity.
    pub fn enqueue(&self, frame: Frame) -> Option<Frame> {
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.frames.push_back((seq, frame));

        match self.capacity {
            Some(capacity) if inner.frames.len() > capacity => {
                inner.frames.pop_front().map(|(_, frame)| frame)
            }
            _ => None,
        }
    }

    fn front(&self) -> Option<(u64, Frame)> {
        self.inner.lock().frames.front().cloned()
    }

    // Removes the head only if it is still the frame that was transmitted;
    // an eviction may have happened while the send was in flight.
    fn acknowledge(&self, seq: u64) {
        let mut inner = self.inner.lock();
        if inner.frames.front().is_some_and(|(head, _)| *head == seq) {
            inner.frames.pop_front();
        }
    }

    /// Transmit queued frames head-first into `sink`.
    ///
    /// Stops at the first send failure and leaves that frame and everything
    /// behind it queued for the next connection.
    pub async fn flush<S>(&self, sink: &mut S) -> Flushed
    where
        S: Sink<Message> + Unpin,
        S::Error: Display,
    {
        let mut flushed = Flushed::default();

        while let Some((seq, frame)) = self.front() {
            let text = match frame.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Dropping unencodable frame '{}': {}", frame.kind, e);
                    self.acknowledge(seq);
                    continue;
                }
            };

            if let Err(e) = sink.send(Message::Text(text.into())).await {
                flushed.error = Some(e.to_string());
                break;
            }
            self.acknowledge(seq);
            flushed.sent += 1;
        }

        flushed.remaining = self.len();
        flushed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }

    /// Snapshot of queued frames, head first
    pub fn frames(&self) -> Vec<Frame> {
        self.inner
            .lock()
            .frames
            .iter()
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.inner.lock().frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::channel::mpsc;

    fn kinds(frames: &[Frame]) -> Vec<String> {
        frames.iter().map(|f| f.kind.clone()).collect()
    }

    fn decode(message: Message) -> Frame {
        match message {
            Message::Text(text) => Frame::parse(text.as_str()).unwrap(),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_flush_preserves_fifo_order() {
        let queue = OutboundQueue::unbounded();
        for kind in ["a", "b", "c"] {
            queue.enqueue(Frame::new(kind, None));
        }

        let (mut tx, rx) = mpsc::unbounded::<Message>();
        let flushed = queue.flush(&mut tx).await;
        drop(tx);

        assert_eq!(flushed.sent, 3);
        assert_eq!(flushed.remaining, 0);
        assert!(!flushed.interrupted());

        let received: Vec<Frame> = rx.map(decode).collect().await;
        assert_eq!(kinds(&received), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_flush_into_closed_sink_keeps_frames() {
        let queue = OutboundQueue::unbounded();
        queue.enqueue(Frame::new("a", None));
        queue.enqueue(Frame::new("b", None));

        let (mut tx, rx) = mpsc::unbounded::<Message>();
        drop(rx);
        let flushed = queue.flush(&mut tx).await;

        assert_eq!(flushed.sent, 0);
        assert_eq!(flushed.remaining, 2);
        assert!(flushed.interrupted());
        assert_eq!(kinds(&queue.frames()), vec!["a", "b"]);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let queue = OutboundQueue::new(Some(2));
        assert!(queue.enqueue(Frame::new("a", None)).is_none());
        assert!(queue.enqueue(Frame::new("b", None)).is_none());

        let evicted = queue.enqueue(Frame::new("c", None));

        assert_eq!(evicted.map(|f| f.kind), Some("a".to_string()));
        assert_eq!(kinds(&queue.frames()), vec!["b", "c"]);
    }

    #[test]
    fn test_unbounded_never_evicts() {
        let queue = OutboundQueue::unbounded();
        for i in 0..5000 {
            assert!(queue.enqueue(Frame::new(format!("f{i}"), None)).is_none());
        }
        assert_eq!(queue.len(), 5000);
    }

    #[test]
    fn test_acknowledge_ignores_evicted_head() {
        let queue = OutboundQueue::new(Some(1));
        queue.enqueue(Frame::new("a", None));
        let (seq, _) = queue.front().unwrap();

        // "a" evicted while its send was in flight
        queue.enqueue(Frame::new("b", None));
        queue.acknowledge(seq);

        assert_eq!(kinds(&queue.frames()), vec!["b"]);
    }

    #[test]
    fn test_clear() {
        let queue = OutboundQueue::unbounded();
        queue.enqueue(Frame::new("a", None));
        queue.clear();
        assert!(queue.is_empty());
    }
}
