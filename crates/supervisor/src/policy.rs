use std::time::Duration;

use rand::Rng;

/// Restart policy: always restart, with exponential backoff between
/// consecutive failures. A child that stays up past `healthy_after` resets
/// the backoff, so a service that crashes once a day restarts promptly while
/// a crash loop backs off to `max_delay`.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    pub base_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    /// Fractional jitter applied to each delay, e.g. 0.1 for ±10%.
    pub jitter: f64,
    pub healthy_after: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            factor: 2,
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
            healthy_after: Duration::from_secs(60),
        }
    }
}

/// Mutable backoff state over a policy. One instance lives for the whole
/// supervisor run.
#[derive(Debug)]
pub struct Backoff {
    policy: RestartPolicy,
    consecutive_failures: u32,
}

// Beyond this the uncapped delay dwarfs any sane max_delay anyway.
const MAX_EXPONENT: u32 = 16;

impl Backoff {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
        }
    }

    /// Record a child exit after `uptime` and return the delay before the
    /// next start attempt.
    pub fn record_exit(&mut self, uptime: Duration) -> Duration {
        if uptime >= self.policy.healthy_after {
            self.consecutive_failures = 0;
        }
        let delay = self.delay_for(self.consecutive_failures);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        delay
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.min(MAX_EXPONENT);
        let uncapped = self
            .policy
            .base_delay
            .saturating_mul(self.policy.factor.saturating_pow(exponent));
        let capped = uncapped.min(self.policy.max_delay);

        if self.policy.jitter > 0.0 {
            let spread = rand::thread_rng().gen_range(-self.policy.jitter..=self.policy.jitter);
            capped.mul_f64(1.0 + spread)
        } else {
            capped
        }
    }
}
