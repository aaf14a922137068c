use crate::infrastructure::{PongNotifier, ReconnectPolicy, TaskManager, TimerHandle};

/// Mutable bookkeeping for one ChannelClient, guarded by a single lock
pub struct ClientState {
    /// Connection generation; bumped on every teardown so stale tasks and
    /// timers can recognise themselves
    pub generation: u64,

    /// Attempt counter and backoff schedule
    pub policy: ReconnectPolicy,

    /// Read and heartbeat tasks of the current connection
    pub tasks: TaskManager,

    /// At most one pending reconnect
    pub reconnect_timer: Option<TimerHandle>,

    /// Pong channel into the running heartbeat monitor
    pub pong_notifier: Option<PongNotifier>,

    /// Message of the most recent connection failure
    pub last_error: Option<String>,
}

impl ClientState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            generation: 0,
            policy,
            tasks: TaskManager::new(),
            reconnect_timer: None,
            pong_notifier: None,
            last_error: None,
        }
    }

    /// Stop everything tied to the current connection and move to a new
    /// generation. Returns the generation that was torn down.
    pub fn teardown(&mut self) -> u64 {
        self.tasks.abort_all();
        self.pong_notifier = None;
        let previous = self.generation;
        self.generation += 1;
        previous
    }

    pub fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.cancel();
        }
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }
}
