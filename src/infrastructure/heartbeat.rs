use crate::types::Frame;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

// Stand-in deadline while no ping is awaiting a reply
const IDLE_DEADLINE: Duration = Duration::from_secs(24 * 60 * 60);

/// The connection a heartbeat monitor watches
#[async_trait]
pub trait HeartbeatLink: Send + Sync + 'static {
    /// Transmit a ping. Returning `false` stops the monitor.
    async fn send_ping(&self, ping: Frame) -> bool;

    /// No pong arrived within the configured timeout
    async fn heartbeat_timeout(&self, waited: Duration);
}

/// Feeds pong ids from the read loop into a running [`HeartbeatManager`]
#[derive(Clone, Debug)]
pub struct PongNotifier {
    tx: mpsc::UnboundedSender<Option<String>>,
}

impl PongNotifier {
    pub fn notify(&self, id: Option<String>) {
        if self.tx.send(id).is_err() {
            tracing::debug!("Pong received after heartbeat monitor stopped");
        }
    }
}

/// Periodic liveness check for one connection.
///
/// The first ping goes out one interval after [`run`](Self::run) starts. With
/// a timeout configured, every ping gets its own deadline. A pong answers the
/// ping carrying its id and every older one; a pong without an id answers all
/// of them. The monitor gives up when the oldest unanswered deadline passes.
pub struct HeartbeatManager {
    interval: Duration,
    timeout: Option<Duration>,
    debug: bool,
    pongs: mpsc::UnboundedReceiver<Option<String>>,
}

impl HeartbeatManager {
    pub fn new(interval: Duration) -> (Self, PongNotifier) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = Self {
            interval,
            timeout: None,
            debug: false,
            pongs: rx,
        };
        (manager, PongNotifier { tx })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Log every ping and pong
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Drive the heartbeat until the link goes away, the notifier is dropped,
    /// or a pong timeout fires.
    pub async fn run<L: HeartbeatLink>(mut self, link: L) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        // Unanswered pings, oldest first: (id, deadline)
        let mut outstanding: VecDeque<(Option<String>, Instant)> = VecDeque::new();

        loop {
            let deadline = outstanding.front().map(|(_, deadline)| *deadline);

            tokio::select! {
                _ = ticker.tick() => {
                    let ping = Frame::ping();
                    let ping_id = ping.id.clone();
                    if !link.send_ping(ping).await {
                        tracing::debug!("Heartbeat link closed, stopping monitor");
                        break;
                    }
                    if self.debug {
                        tracing::debug!("Sent heartbeat with id {:?}", ping_id);
                    }

                    if let Some(timeout) = self.timeout {
                        outstanding.push_back((ping_id, Instant::now() + timeout));
                    }
                }
                _ = time::sleep_until(deadline.unwrap_or_else(|| Instant::now() + IDLE_DEADLINE)),
                    if deadline.is_some() =>
                {
                    let waited = self.timeout.unwrap_or_default();
                    tracing::warn!("Heartbeat timeout - no pong within {:?}", waited);
                    link.heartbeat_timeout(waited).await;
                    break;
                }
                pong = self.pongs.recv() => {
                    let Some(pong_id) = pong else {
                        break;
                    };
                    let answered = match &pong_id {
                        None => outstanding.len(),
                        Some(id) => outstanding
                            .iter()
                            .position(|(ping_id, _)| ping_id.as_deref() == Some(id.as_str()))
                            .map_or(0, |index| index + 1),
                    };
                    if answered > 0 {
                        outstanding.drain(..answered);
                        if self.debug {
                            tracing::debug!("Received heartbeat ack for id {:?}", pong_id);
                        }
                    } else if self.debug {
                        tracing::debug!("Ignoring unmatched pong {:?}", pong_id);
                    }
                }
            }
        }
        tracing::debug!("Heartbeat task finished");
    }
}
