use std::time::Duration;

use config::RetryConfig;

/// Reusable backoff policy: exponential growth with a cap and optional
/// jitter. Delay computation is pure so the schedule can be tested without
/// any network code.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub jitter: bool
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
            jitter: config.jitter
        }
    }

    /// Base delay before retry number `retry` (0-based), without jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.initial_backoff.as_millis() as f64;
        let exp = base * self.multiplier.powi(retry as i32);
        let capped = exp.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// `delay_for` with jitter applied (±15%) when enabled.
    pub fn jittered_delay_for(&self, retry: u32) -> Duration {
        let base = self.delay_for(retry);
        if !self.jitter {
            return base;
        }
        let factor = rand::random::<f64>() * 0.3 + 0.85;
        Duration::from_millis((base.as_millis() as f64 * factor) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: bool) -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
            multiplier: 2.0,
            jitter
        }
    }

    #[test]
    fn delays_grow_exponentially() {
        let p = policy(false);
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn delays_are_capped() {
        let p = policy(false);
        assert_eq!(p.delay_for(10), Duration::from_millis(1000));
    }

    #[test]
    fn jitter_stays_within_band() {
        let p = policy(true);
        for _ in 0..100 {
            let d = p.jittered_delay_for(1).as_millis();
            assert!((170..=230).contains(&d), "jittered delay out of band: {d}");
        }
    }

    #[test]
    fn jitter_disabled_is_exact() {
        let p = policy(false);
        assert_eq!(p.jittered_delay_for(2), Duration::from_millis(400));
    }
}
