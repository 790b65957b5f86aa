//! Reconnection policy with bounded exponential backoff.
//!
//! The client retries a lost connection only while an identity is known
//! and the attempt budget has not been spent. Delays start at the
//! initial value and double after each fired retry, capped at the
//! maximum; a successful open resets both the attempt count and the
//! delay.

use std::time::Duration;
use tokio::task::JoinHandle;

/// Limits for automatic reconnection
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on the delay between retries
    pub max_delay: Duration,
    /// Retries attempted before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay to use after one more failed attempt at `current`
    pub fn next_delay(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_delay)
    }
}

/// Mutable reconnect bookkeeping owned by the client
#[derive(Debug)]
pub(crate) struct ReconnectState {
    /// Retries fired since the last successful open
    pub attempts: u32,
    /// Delay for the next scheduled retry
    pub delay: Duration,
    /// The pending retry timer, at most one at any instant
    pub timer: Option<JoinHandle<()>>,
}

impl ReconnectState {
    pub fn new(policy: &ReconnectPolicy) -> Self {
        Self {
            attempts: 0,
            delay: policy.initial_delay,
            timer: None,
        }
    }

    /// Abort the pending retry timer, if any
    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Back to the initial state after a successful open
    pub fn reset(&mut self, policy: &ReconnectPolicy) {
        self.cancel_timer();
        self.attempts = 0;
        self.delay = policy.initial_delay;
    }
}

impl Drop for ReconnectState {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_schedule_doubles_and_caps() {
        let policy = ReconnectPolicy::default();
        let mut delay = policy.initial_delay;
        let mut schedule = Vec::new();

        for _ in 0..6 {
            schedule.push(delay.as_millis());
            delay = policy.next_delay(delay);
        }

        assert_eq!(schedule, vec![1000, 2000, 4000, 8000, 16_000, 30_000]);
        // once capped, the delay stays at the cap
        assert_eq!(policy.next_delay(delay).as_millis(), 30_000);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let policy = ReconnectPolicy::default();
        let mut state = ReconnectState::new(&policy);

        state.attempts = 3;
        state.delay = Duration::from_millis(8000);
        state.reset(&policy);

        assert_eq!(state.attempts, 0);
        assert_eq!(state.delay, policy.initial_delay);
        assert!(state.timer.is_none());
    }

    #[tokio::test]
    async fn test_cancel_timer_aborts_pending_task() {
        let policy = ReconnectPolicy::default();
        let mut state = ReconnectState::new(&policy);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let _ = tx.send(());
        }));

        state.cancel_timer();
        assert!(state.timer.is_none());
        assert!(rx.await.is_err());
    }
}
