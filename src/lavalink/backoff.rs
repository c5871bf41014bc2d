use rand::Rng;
use std::time::Duration;

/// Delay policy for reconnecting the Lavalink push socket.
///
/// `delay = min(max, attempt * step + jitter)` with jitter drawn from
/// `jitter_min..jitter_max`.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    step: Duration,
    jitter_min: Duration,
    jitter_max: Duration,
    max: Duration,
}

impl ReconnectPolicy {
    pub fn new(step: Duration, jitter_min: Duration, jitter_max: Duration, max: Duration) -> Self {
        Self {
            step,
            jitter_min,
            jitter_max: jitter_max.max(jitter_min),
            max,
        }
    }

    pub fn max_delay(&self) -> Duration {
        self.max
    }

    /// Deterministic part of the formula, for a given jitter.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        self.step
            .saturating_mul(attempt)
            .saturating_add(jitter)
            .min(self.max)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_max > self.jitter_min {
            rand::thread_rng().gen_range(self.jitter_min..self.jitter_max)
        } else {
            self.jitter_min
        };
        self.delay_with_jitter(attempt, jitter)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(500),
            Duration::from_millis(100),
            Duration::from_millis(1000),
            Duration::from_secs(30),
        )
    }
}

/// Attempt counter of one reconnect loop.
#[derive(Debug)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Counts another attempt and returns its number and how long to wait first.
    pub fn next_attempt(&mut self) -> (u32, Duration) {
        self.attempt = self.attempt.saturating_add(1);
        (self.attempt, self.policy.delay_for_attempt(self.attempt))
    }

    /// A connection was re-established; the next outage starts from attempt 1.
    pub fn succeeded(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
