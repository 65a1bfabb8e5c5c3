// ── Reconnect backoff ──
//
// Exponential delay between reconnect attempts, capped at a maximum, with a
// ceiling on the number of attempts. Owned by the connection state machine.

use std::time::Duration;

use crate::config::StreamConfig;

/// What the scheduler wants to happen after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStep {
    /// Wait `delay`, then retry.
    Retry { delay: Duration, attempt: u32 },
    /// The ceiling was reached just now. Reported once per cycle.
    Exhausted { attempts: u32 },
    /// Already exhausted earlier; nothing further to do.
    Idle,
}

/// Reconnect attempt counter plus delay policy.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    attempt: u32,
    exhausted: bool,
}

impl Backoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
            attempt: 0,
            exhausted: false,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(
            config.initial_reconnect_delay,
            config.max_reconnect_delay,
            config.max_reconnect_attempts,
        )
    }

    /// `min(initial * 2^attempt, max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        1u32.checked_shl(attempt)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Number of the next retry (0 for the first one).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Decide what follows a failure. Does not advance the counter; call
    /// [`begin_attempt`](Self::begin_attempt) when the retry actually starts.
    pub fn next_step(&mut self) -> BackoffStep {
        if self.exhausted {
            return BackoffStep::Idle;
        }
        if self.attempt >= self.max_attempts {
            self.exhausted = true;
            return BackoffStep::Exhausted {
                attempts: self.attempt,
            };
        }
        BackoffStep::Retry {
            delay: self.delay(self.attempt),
            attempt: self.attempt,
        }
    }

    /// Count a retry. Called immediately before the retry opens the transport.
    pub fn begin_attempt(&mut self) {
        self.attempt = self.attempt.saturating_add(1);
    }

    /// A connection was acknowledged: start counting from zero again.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.exhausted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn delays_double_then_cap() {
        let backoff = Backoff::new(ms(1000), ms(8000), 10);
        let delays: Vec<_> = (0..5).map(|a| backoff.delay(a)).collect();
        assert_eq!(delays, vec![ms(1000), ms(2000), ms(4000), ms(8000), ms(8000)]);
    }

    #[test]
    fn delays_are_non_decreasing_and_bounded() {
        let backoff = Backoff::new(ms(250), ms(30_000), 64);
        let mut previous = Duration::ZERO;
        for attempt in 0..64 {
            let delay = backoff.delay(attempt);
            assert!(delay >= previous, "attempt {attempt}: {delay:?} < {previous:?}");
            assert!(delay <= ms(30_000), "attempt {attempt}: {delay:?} over cap");
            previous = delay;
        }
        assert_eq!(backoff.delay(63), ms(30_000));
    }

    #[test]
    fn exhaustion_reported_once() {
        let mut backoff = Backoff::new(ms(10), ms(100), 2);

        assert_eq!(
            backoff.next_step(),
            BackoffStep::Retry {
                delay: ms(10),
                attempt: 0
            }
        );
        backoff.begin_attempt();
        assert_eq!(
            backoff.next_step(),
            BackoffStep::Retry {
                delay: ms(20),
                attempt: 1
            }
        );
        backoff.begin_attempt();
        assert_eq!(backoff.next_step(), BackoffStep::Exhausted { attempts: 2 });
        assert_eq!(backoff.next_step(), BackoffStep::Idle);
        assert_eq!(backoff.next_step(), BackoffStep::Idle);
    }

    #[test]
    fn zero_attempts_exhausts_immediately() {
        let mut backoff = Backoff::new(ms(10), ms(100), 0);
        assert_eq!(backoff.next_step(), BackoffStep::Exhausted { attempts: 0 });
    }

    #[test]
    fn reset_restores_initial_delay() {
        let mut backoff = Backoff::new(ms(100), ms(1000), 5);
        backoff.begin_attempt();
        backoff.begin_attempt();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(
            backoff.next_step(),
            BackoffStep::Retry {
                delay: ms(100),
                attempt: 0
            }
        );
    }
}
