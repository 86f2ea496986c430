use std::time::{Duration, Instant};

/// Capped exponential backoff with a bounded number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(8),
            max_attempts: 5,
        }
    }
}

impl Backoff {
    /// Delay before attempt number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// A single cancellable pending retry.
#[derive(Debug, Default)]
pub struct ScheduledRetry {
    due: Option<Instant>,
    attempts: u32,
}

impl ScheduledRetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules the next attempt. Returns the delay, or `None` once the attempt
    /// budget is spent.
    pub fn schedule(&mut self, now: Instant, backoff: &Backoff) -> Option<Duration> {
        if self.attempts >= backoff.max_attempts {
            self.due = None;
            return None;
        }
        let delay = backoff.delay(self.attempts);
        self.attempts += 1;
        self.due = Some(now + delay);
        Some(delay)
    }

    /// Fires at most once per schedule.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.due {
            Some(due) if now >= due => {
                self.due = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.due = None;
    }

    /// Cancels and forgets previous attempts.
    pub fn reset(&mut self) {
        self.due = None;
        self.attempts = 0;
    }

    pub fn is_pending(&self) -> bool {
        self.due.is_some()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_up_to_cap() {
        let backoff = Backoff {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(5),
            max_attempts: 10,
        };
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(3), Duration::from_secs(5));
        assert_eq!(backoff.delay(40), Duration::from_secs(5));
    }

    #[test]
    fn retry_fires_once_when_due() {
        let backoff = Backoff::default();
        let start = Instant::now();
        let mut retry = ScheduledRetry::new();
        let delay = retry.schedule(start, &backoff).unwrap();
        assert!(!retry.poll(start));
        assert!(retry.poll(start + delay));
        assert!(!retry.poll(start + delay * 2));
    }

    #[test]
    fn cancel_prevents_firing() {
        let start = Instant::now();
        let mut retry = ScheduledRetry::new();
        retry.schedule(start, &Backoff::default());
        retry.cancel();
        assert!(!retry.is_pending());
        assert!(!retry.poll(start + Duration::from_secs(60)));
    }

    #[test]
    fn budget_is_bounded() {
        let backoff = Backoff {
            max_attempts: 2,
            ..Backoff::default()
        };
        let now = Instant::now();
        let mut retry = ScheduledRetry::new();
        assert!(retry.schedule(now, &backoff).is_some());
        assert!(retry.schedule(now, &backoff).is_some());
        assert!(retry.schedule(now, &backoff).is_none());
        retry.reset();
        assert!(retry.schedule(now, &backoff).is_some());
    }
}
