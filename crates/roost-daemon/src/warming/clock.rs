//! Deadline- and shutdown-aware pacing clock for warming loops.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Tracks one session's time budget and the shared stop signal.
///
/// Warmers call [`SessionClock::rest`] for every pause; the wait is truncated
/// at the deadline and aborted by the stop signal, so loops never overrun
/// their budget and shutdown preempts within a single wait.
pub struct SessionClock {
    deadline: Instant,
    shutdown: watch::Receiver<bool>,
}

impl SessionClock {
    pub fn new(budget: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            deadline: Instant::now() + budget,
            shutdown,
        }
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the budget is exhausted.
    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Whether the stop signal has fired.
    pub fn stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// A fresh receiver for the same stop signal.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }

    /// Pause for up to `wait`, bounded by the deadline.
    ///
    /// Returns true when the loop should continue; false when the budget is
    /// exhausted or the stop signal fired.
    pub async fn rest(&mut self, wait: Duration) -> bool {
        if self.stopped() || self.expired() {
            return false;
        }

        let wait = wait.min(self.remaining());
        let sleep = tokio::time::sleep(wait);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => break,
                changed = self.shutdown.changed() => {
                    match changed {
                        Ok(()) => {
                            if *self.shutdown.borrow() {
                                return false;
                            }
                        }
                        // Sender gone: no stop signal can arrive anymore
                        Err(_) => {
                            sleep.as_mut().await;
                            break;
                        }
                    }
                }
            }
        }

        !self.expired() && !self.stopped()
    }
}
