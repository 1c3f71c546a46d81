use std::time::Duration;

/// Capped multiplicative backoff for reconnecting to a dropped peer.
///
/// Defaults: 1 s initial delay, ×1.5 per consecutive failure, 10 s cap.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub factor: f64,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            factor: 1.5,
            max: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            next: self.initial.min(self.max),
            attempts: 0,
        }
    }
}

/// Running state of a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    next: Duration,
    attempts: u32,
}

impl Backoff {
    /// Delay to wait before the next attempt; grows the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        let factor = if self.policy.factor.is_finite() && self.policy.factor >= 1.0 {
            self.policy.factor
        } else {
            1.0
        };
        self.next = delay.mul_f64(factor).min(self.policy.max);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Call after a successful connect.
    pub fn reset(&mut self) {
        self.next = self.policy.initial.min(self.policy.max);
        self.attempts = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_by_factor_and_caps() {
        let delays: Vec<u128> = ReconnectPolicy::default()
            .backoff()
            .take(8)
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(delays, vec![1000, 1500, 2250, 3375, 5062, 7593, 10000, 10000]);
    }

    #[test]
    fn reset_returns_to_initial() {
        let mut backoff = ReconnectPolicy::default().backoff();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempts(), 2);
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn degenerate_factor_holds_delay_steady() {
        let policy = ReconnectPolicy {
            factor: 0.5,
            ..ReconnectPolicy::default()
        };
        let mut backoff = policy.backoff();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
