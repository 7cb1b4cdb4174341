//! Reconnect delay policy.

use std::time::Duration;

use rand::Rng;

/// Exponential reconnect backoff: the delay doubles after every failed
/// session up to a ceiling, and resets once a session registers.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_secs(1));
        Self {
            initial,
            max: max.max(initial),
            current: initial,
            failures: 0,
        }
    }

    /// A session registered; start over from the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.failures = 0;
    }

    /// Delay before the next attempt, without jitter, then advance.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.failures = self.failures.saturating_add(1);
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// [`next_delay`](Self::next_delay) plus up to 10% random jitter, so a
    /// fleet of bots does not reconnect in lockstep after a netsplit.
    pub fn next_delay_jittered(&mut self) -> Duration {
        let delay = self.next_delay();
        let spread = delay.as_millis() as u64 / 10;
        let jitter = rand::thread_rng().gen_range(0..=spread);
        delay + Duration::from_millis(jitter)
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_up_to_ceiling() {
        let mut backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(60));
        let delays: Vec<u64> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, [10, 20, 40, 60, 60]);
        assert_eq!(backoff.failures(), 5);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let mut backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(10));
        for _ in 0..20 {
            let delay = backoff.next_delay_jittered();
            assert!(delay >= Duration::from_secs(10));
            assert!(delay <= Duration::from_secs(11));
        }
    }
}
