use serde::{Deserialize, Serialize};

use crate::{ErrorKind, Result};

/// Default number of requests per minute
pub const DEFAULT_RPM_LIMIT: u64 = 150;

/// Default number of tokens per minute
pub const DEFAULT_TPM_BUDGET: u64 = 2_000_000;

/// Default number of requests per day
pub const DEFAULT_RPD_LIMIT: u64 = 10_000;

/// Budgets enforced by a [`crate::ratelimit::RateLimiter`].
///
/// The budgets are fixed for the lifetime of a limiter. To change them,
/// construct a new limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Maximum number of calls in any 60 second window
    #[serde(default = "default_rpm_limit")]
    pub max_requests_per_minute: u64,

    /// Maximum summed token cost in any 60 second window
    #[serde(default = "default_tpm_budget")]
    pub max_tokens_per_minute: u64,

    /// Maximum number of calls in any 24 hour window
    #[serde(default = "default_rpd_limit")]
    pub max_requests_per_day: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: default_rpm_limit(),
            max_tokens_per_minute: default_tpm_budget(),
            max_requests_per_day: default_rpd_limit(),
        }
    }
}

const fn default_rpm_limit() -> u64 {
    DEFAULT_RPM_LIMIT
}

const fn default_tpm_budget() -> u64 {
    DEFAULT_TPM_BUDGET
}

const fn default_rpd_limit() -> u64 {
    DEFAULT_RPD_LIMIT
}

impl RateLimitConfig {
    /// Create a config from the three budgets
    #[must_use]
    pub const fn new(rpm: u64, tpm: u64, rpd: u64) -> Self {
        Self {
            max_requests_per_minute: rpm,
            max_tokens_per_minute: tpm,
            max_requests_per_day: rpd,
        }
    }

    /// Check that every budget is at least 1.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidRateLimit`] naming the first zero budget.
    pub fn validate(&self) -> Result<()> {
        if self.max_requests_per_minute == 0 {
            return Err(ErrorKind::InvalidRateLimit {
                field: "max_requests_per_minute",
            });
        }
        if self.max_tokens_per_minute == 0 {
            return Err(ErrorKind::InvalidRateLimit {
                field: "max_tokens_per_minute",
            });
        }
        if self.max_requests_per_day == 0 {
            return Err(ErrorKind::InvalidRateLimit {
                field: "max_requests_per_day",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rate_limit_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.max_requests_per_minute, 150);
        assert_eq!(config.max_tokens_per_minute, 2_000_000);
        assert_eq!(config.max_requests_per_day, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_budget_is_rejected() {
        let config = RateLimitConfig::new(60, 0, 100);
        assert_eq!(
            config.validate(),
            Err(ErrorKind::InvalidRateLimit {
                field: "max_tokens_per_minute"
            })
        );
    }

    #[test]
    fn test_config_deserialization_with_defaults() {
        let config: RateLimitConfig = toml::from_str("max_requests_per_minute = 60").unwrap();
        assert_eq!(config.max_requests_per_minute, 60);
        assert_eq!(config.max_tokens_per_minute, DEFAULT_TPM_BUDGET);
        assert_eq!(config.max_requests_per_day, DEFAULT_RPD_LIMIT);
    }

    #[test]
    fn test_config_serialization() {
        let config = RateLimitConfig::new(10, 20, 30);
        let toml = toml::to_string(&config).unwrap();
        let deserialized: RateLimitConfig = toml::from_str(&toml).unwrap();
        assert_eq!(config, deserialized);
    }
}
