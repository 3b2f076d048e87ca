use std::time::Duration;

use crate::config::RetryConfig;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// No further pass.
    NoRetry,
    /// Run another pass after the given delay.
    RetryAfter(Duration),
}

/// Bounded number of retry passes with exponential backoff and a cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retry passes allowed after the initial pass.
    pub passes: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        let max_delay = Duration::from_secs(cfg.max_delay_secs);
        // Out-of-range values (inf, too large) fall back to the cap.
        let base_delay = Duration::try_from_secs_f64(cfg.base_delay_secs.max(0.0)).unwrap_or(max_delay);
        Self {
            passes: cfg.passes,
            base_delay,
            max_delay,
        }
    }

    /// No retry passes at all.
    pub fn none() -> Self {
        Self {
            passes: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Decide whether retry pass `pass` (1-based) may run given `pending`
    /// outstanding failures.
    pub fn decide(&self, pass: u32, pending: usize) -> RetryDecision {
        if pending == 0 || pass == 0 || pass > self.passes {
            return RetryDecision::NoRetry;
        }
        // base * 2^(pass-1), capped.
        let exp = 1u32 << pass.saturating_sub(1).min(8);
        let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);
        RetryDecision::RetryAfter(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_retry_passes() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1, 3), RetryDecision::NoRetry);
    }

    #[test]
    fn no_retry_without_failures() {
        let p = RetryPolicy {
            passes: 3,
            ..RetryPolicy::default()
        };
        assert_eq!(p.decide(1, 0), RetryDecision::NoRetry);
    }

    #[test]
    fn exponential_backoff_grows_and_is_capped() {
        let p = RetryPolicy {
            passes: 20,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
        };
        let delay = |pass| match p.decide(pass, 1) {
            RetryDecision::RetryAfter(d) => d,
            RetryDecision::NoRetry => panic!("expected retry"),
        };
        assert_eq!(delay(1), Duration::from_millis(500));
        assert_eq!(delay(2), Duration::from_secs(1));
        assert!(delay(3) >= delay(2));
        assert_eq!(delay(10), Duration::from_secs(4));
    }

    #[test]
    fn unrepresentable_base_delay_falls_back_to_cap() {
        for base_delay_secs in [f64::INFINITY, 1e30, f64::NAN, -2.0] {
            let p = RetryPolicy::from_config(&RetryConfig {
                passes: 1,
                base_delay_secs,
                max_delay_secs: 7,
            });
            assert!(p.base_delay <= Duration::from_secs(7), "{base_delay_secs}");
            assert!(matches!(p.decide(1, 1), RetryDecision::RetryAfter(d) if d <= Duration::from_secs(7)));
        }
    }

    #[test]
    fn respects_pass_count() {
        let p = RetryPolicy {
            passes: 2,
            ..RetryPolicy::default()
        };
        assert!(matches!(p.decide(1, 1), RetryDecision::RetryAfter(_)));
        assert!(matches!(p.decide(2, 1), RetryDecision::RetryAfter(_)));
        assert_eq!(p.decide(3, 1), RetryDecision::NoRetry);
    }
}
