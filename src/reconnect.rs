//! Reconnection policy: fixed delay, bounded attempts.
//!
//! `decide` is a pure function of the engine's current state so the rules
//! can be tested without a transport. The engine owns the counter and the
//! timer; this module only says what to do next.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::ClientConfig;

/// When and whether to retry after a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retry at all.
    pub enabled: bool,
    /// Fixed wait before every attempt.
    pub delay: Duration,
    /// Consecutive failures allowed before giving up.
    pub max_attempts: u32,
}

impl From<&ClientConfig> for ReconnectPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            enabled: config.auto_reconnect,
            delay: config.reconnect_delay,
            max_attempts: config.max_reconnect_attempts,
        }
    }
}

/// Snapshot of the engine state the policy looks at.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconnectInputs {
    /// Caller requested shutdown.
    pub closed: bool,
    /// Attempts made since the last successful open.
    pub attempts: u32,
    /// A retry timer is already scheduled.
    pub retry_scheduled: bool,
    /// A connect attempt is already underway.
    pub connecting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing to do: closed, disabled, or a retry is already on its way.
    Idle,
    /// Ceiling reached; stop until a successful open or a manual reset.
    Exhausted { attempts: u32 },
    /// Record `attempt` and connect again after `delay`.
    Retry { attempt: u32, delay: Duration },
}

impl ReconnectPolicy {
    #[must_use]
    pub fn decide(&self, inputs: ReconnectInputs) -> Decision {
        if inputs.closed || !self.enabled {
            return Decision::Idle;
        }
        if inputs.retry_scheduled || inputs.connecting {
            return Decision::Idle;
        }
        if inputs.attempts >= self.max_attempts {
            return Decision::Exhausted {
                attempts: inputs.attempts,
            };
        }
        Decision::Retry {
            attempt: inputs.attempts + 1,
            delay: self.delay,
        }
    }
}

/// Retry bookkeeping owned by the connection engine.
#[derive(Debug, Default)]
pub struct ReconnectState {
    pub attempts: u32,
    pub timer: Option<JoinHandle<()>>,
    /// The max-attempts notice has gone out for the current streak.
    pub exhausted: bool,
}

impl ReconnectState {
    /// Forget the failure streak. Called on every successful open.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.exhausted = false;
    }

    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
#[path = "reconnect_test.rs"]
mod tests;
