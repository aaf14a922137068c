use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Exponential backoff bookkeeping for reconnection.
///
/// Attempt `n` (counted from 1) waits `base * 2^(n-1)`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    attempts: u32,
    base: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            base,
            max_delay,
            max_attempts,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Delay before attempt number `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.max_delay)
    }

    /// Count one more attempt and return its number and delay, or `None`
    /// once the configured maximum has been reached.
    pub fn next_attempt(&mut self) -> Option<(u32, Duration)> {
        if self.is_exhausted() {
            return None;
        }
        self.attempts += 1;
        Some((self.attempts, self.delay_for(self.attempts)))
    }

    /// Reset the counter (called on every successful connect)
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// Handle to a one-shot timer spawned with [`schedule`].
///
/// Dropping or cancelling the handle aborts the timer task.
#[derive(Debug)]
pub struct TimerHandle {
    handle: Option<JoinHandle<()>>,
}

impl TimerHandle {
    pub fn cancel(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Give up ownership without aborting. Used by the timer task itself once
    /// it has fired, so clearing the slot does not cancel the running body.
    pub fn detach(mut self) {
        self.handle.take();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Run `task` once after `delay`
pub fn schedule<F>(delay: Duration, task: F) -> TimerHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        task.await;
    });
    TimerHandle {
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_backoff_doubles_from_base() {
        let policy = ReconnectPolicy::new(Duration::from_millis(50), Duration::from_secs(30), 5);
        assert_eq!(policy.delay_for(1), Duration::from_millis(50));
        assert_eq!(policy.delay_for(2), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(200));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(5), 10);
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn test_next_attempt_stops_at_max() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(10), Duration::from_secs(1), 2);
        assert_eq!(policy.next_attempt(), Some((1, Duration::from_millis(10))));
        assert_eq!(policy.next_attempt(), Some((2, Duration::from_millis(20))));
        assert_eq!(policy.next_attempt(), None);
        assert!(policy.is_exhausted());

        policy.reset();
        assert_eq!(policy.attempts(), 0);
        assert!(!policy.is_exhausted());
    }

    #[test]
    fn test_zero_max_attempts_is_immediately_exhausted() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(10), Duration::from_secs(1), 0);
        assert_eq!(policy.next_attempt(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let handle = schedule(Duration::from_millis(100), async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let handle = schedule(Duration::from_millis(100), async move {
            flag.store(true, Ordering::SeqCst);
        });

        handle.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_timer_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        drop(schedule(Duration::from_millis(100), async move {
            flag.store(true, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(!fired.load(Ordering::SeqCst));
    }
}
