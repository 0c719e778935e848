// ============================================================================
// Rate Limit Configuration
// ============================================================================

use std::time::Duration;

use crate::rate_limit::{BucketLimit, SensitivityClass};

const DEFAULT_GENERAL_PER_MINUTE: u64 = 100;
const DEFAULT_SENSITIVE_PER_MINUTE: u64 = 10;
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Per-class bucket limits and eviction policy for the admission filter.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub general: BucketLimit,
    pub sensitive: BucketLimit,
    /// Value advertised in `Retry-After` on a 429.
    pub retry_after_secs: u64,
    /// Buckets idle for this many periods become eligible for eviction.
    /// 0 disables eviction (buckets live for the whole process).
    pub idle_eviction_periods: u32,
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            general: BucketLimit::per_minute(DEFAULT_GENERAL_PER_MINUTE),
            sensitive: BucketLimit::per_minute(DEFAULT_SENSITIVE_PER_MINUTE),
            retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
            idle_eviction_periods: 0,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl RateLimitConfig {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            general: limit_from_env("GENERAL", DEFAULT_GENERAL_PER_MINUTE),
            sensitive: limit_from_env("SENSITIVE", DEFAULT_SENSITIVE_PER_MINUTE),
            retry_after_secs: std::env::var("RATE_LIMIT_RETRY_AFTER_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            idle_eviction_periods: std::env::var("RATE_LIMIT_IDLE_EVICTION_PERIODS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            sweep_interval_secs: std::env::var("RATE_LIMIT_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (class, limit) in [
            (SensitivityClass::General, &self.general),
            (SensitivityClass::Sensitive, &self.sensitive),
        ] {
            if limit.capacity == 0 {
                anyhow::bail!("Rate limit capacity for '{}' must be greater than 0", class);
            }
            if limit.refill_per_period == 0 {
                anyhow::bail!("Rate limit refill for '{}' must be greater than 0", class);
            }
            if limit.period.is_zero() {
                anyhow::bail!("Rate limit period for '{}' must be greater than 0", class);
            }
        }
        if self.idle_eviction_periods > 0 {
            if self.sweep_interval_secs == 0 {
                anyhow::bail!("RATE_LIMIT_SWEEP_INTERVAL_SECS must be greater than 0 when eviction is enabled");
            }
            if self.idle_eviction_after().is_none() {
                anyhow::bail!("RATE_LIMIT_IDLE_EVICTION_PERIODS is too large for the configured periods");
            }
        }
        Ok(())
    }

    /// How long a bucket must sit untouched before the sweeper may drop it,
    /// or `None` when eviction is disabled or the window does not fit in a
    /// `Duration`.
    pub fn idle_eviction_after(&self) -> Option<Duration> {
        if self.idle_eviction_periods == 0 {
            return None;
        }
        let longest = self.general.period.max(self.sensitive.period);
        longest.checked_mul(self.idle_eviction_periods)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn limit_from_env(class: &str, default_per_minute: u64) -> BucketLimit {
    let capacity = std::env::var(format!("RATE_LIMIT_{}_CAPACITY", class))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_per_minute);
    let refill_per_period = std::env::var(format!("RATE_LIMIT_{}_REFILL", class))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(capacity);
    let period_secs: u64 = std::env::var(format!("RATE_LIMIT_{}_PERIOD_SECS", class))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);

    BucketLimit {
        capacity,
        refill_per_period,
        period: Duration::from_secs(period_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_platform_limits() {
        let config = RateLimitConfig::default();
        assert_eq!(config.general, BucketLimit::per_minute(100));
        assert_eq!(config.sensitive, BucketLimit::per_minute(10));
        assert_eq!(config.retry_after_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_eviction_disabled_by_default() {
        assert_eq!(RateLimitConfig::default().idle_eviction_after(), None);
    }

    #[test]
    fn test_eviction_window_uses_longest_period() {
        let mut config = RateLimitConfig::default();
        config.sensitive.period = Duration::from_secs(120);
        config.idle_eviction_periods = 3;
        assert_eq!(config.idle_eviction_after(), Some(Duration::from_secs(360)));
    }

    #[test]
    fn test_eviction_window_overflow_rejected() {
        let mut config = RateLimitConfig::default();
        config.general.period = Duration::from_secs(u64::MAX / 2);
        config.idle_eviction_periods = 4;
        assert_eq!(config.idle_eviction_after(), None);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_IDLE_EVICTION_PERIODS"));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = RateLimitConfig::default();
        config.sensitive.capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sensitive"));
    }
}
