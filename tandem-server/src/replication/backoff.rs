//! Reconnect backoff and give-up policy
//!
//! A master that is merely slow gets ordinary exponential backoff. A master
//! that keeps coming back and dropping again (more successful reconnects than
//! the configured limit inside the trailing window) is left alone until an
//! operator issues `failover-reset`.

use super::config::BackoffConfig;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Delay and give-up state for reconnecting to the master
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    config: BackoffConfig,
    current_timeout_ms: u64,
    /// Successful reconnects, oldest first
    reconnect_history: VecDeque<Instant>,
}

impl ReconnectBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current_timeout_ms: config.initial_timeout_ms,
            reconnect_history: VecDeque::with_capacity(config.max_reconnects_per_window + 1),
            config,
        }
    }

    /// Delay the next scheduled attempt will wait
    pub fn current_timeout(&self) -> Duration {
        Duration::from_millis(self.current_timeout_ms)
    }

    /// Delay for the attempt being scheduled now; grows the following one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_timeout();

        let mut grown = self
            .current_timeout_ms
            .saturating_mul(self.config.growth_factor);
        if let Some(max) = self.config.max_timeout_ms {
            grown = grown.min(max);
        }
        self.current_timeout_ms = grown;

        delay
    }

    /// Record a successful reconnect and start the delay over
    pub fn on_reconnect(&mut self, now: Instant) {
        self.reconnect_history.push_back(now);
        self.limit_to(self.config.max_reconnects_per_window + 1);
        self.reset_timeout();
    }

    /// Whether automatic reconnects should stop
    pub fn give_up(&mut self, now: Instant) -> bool {
        let window = Duration::from_secs(self.config.window_secs);
        while self
            .reconnect_history
            .front()
            .is_some_and(|at| now.duration_since(*at) > window)
        {
            self.reconnect_history.pop_front();
        }
        self.limit_to(self.config.max_reconnects_per_window + 1);

        let give_up = self.reconnect_history.len() > self.config.max_reconnects_per_window;
        if give_up {
            debug!(
                "{} reconnects within {}s, giving up on the master",
                self.reconnect_history.len(),
                self.config.window_secs
            );
        }
        give_up
    }

    /// Forget history and restore the initial delay
    pub fn reset(&mut self) {
        self.reconnect_history.clear();
        self.reset_timeout();
    }

    pub fn reset_timeout(&mut self) {
        self.current_timeout_ms = self.config.initial_timeout_ms;
    }

    /// Reconnects currently remembered (pruned on `give_up`)
    pub fn reconnects_in_window(&self) -> usize {
        self.reconnect_history.len()
    }

    fn limit_to(&mut self, limit: usize) {
        while self.reconnect_history.len() > limit {
            self.reconnect_history.pop_front();
        }
    }
}
