use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::concurrency::{
    DEFAULT_DRAIN_TIMEOUT, DEFAULT_GLOBAL_LIMIT, DEFAULT_MAX_PARALLEL_DOCUMENTS,
    DEFAULT_PAGE_CONCURRENCY, DEFAULT_SEQUENTIAL_THRESHOLD, FanoutCoordinator,
};
use crate::ratelimit::{DEFAULT_RPD_LIMIT, DEFAULT_RPM_LIMIT, DEFAULT_TPM_BUDGET, RateLimitConfig};
use crate::retry::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_WAIT_TIME, RetryPolicy};
use crate::validate::{DEFAULT_AVG_PAGES, ProposedConfig};
use crate::{ErrorKind, Result};

/// All tunables of the coordination layer.
///
/// Every field has a default, so an empty TOML file is a valid
/// configuration. Durations use human-readable strings such as `"5m"`.
///
/// ```toml
/// global_limit = 100
/// rpm_limit = 60
/// drain_timeout = "30s"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuotaConfig {
    /// Capacity of the process-wide governor
    pub global_limit: usize,
    /// Pages in flight per document
    pub page_concurrency: usize,
    /// Documents processed side by side
    pub max_parallel_documents: usize,
    /// Batches up to this size are processed sequentially
    pub sequential_threshold: usize,
    /// Requests per minute allowed by the remote service
    pub rpm_limit: u64,
    /// Tokens per minute allowed by the remote service
    pub tpm_budget: u64,
    /// Requests per day allowed by the remote service
    pub rpd_limit: u64,
    /// How long a shrinking limit adjustment waits for in-flight calls
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Duration,
    /// Retries of a failed remote call
    pub max_retries: u64,
    /// Wait before the first retry
    #[serde(with = "humantime_serde")]
    pub retry_wait_time: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            global_limit: DEFAULT_GLOBAL_LIMIT,
            page_concurrency: DEFAULT_PAGE_CONCURRENCY,
            max_parallel_documents: DEFAULT_MAX_PARALLEL_DOCUMENTS,
            sequential_threshold: DEFAULT_SEQUENTIAL_THRESHOLD,
            rpm_limit: DEFAULT_RPM_LIMIT,
            tpm_budget: DEFAULT_TPM_BUDGET,
            rpd_limit: DEFAULT_RPD_LIMIT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_wait_time: DEFAULT_RETRY_WAIT_TIME,
        }
    }
}

impl QuotaConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid
    /// configuration.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ErrorKind::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ErrorKind::ParseConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Budgets for the rate limiter
    #[must_use]
    pub const fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig::new(self.rpm_limit, self.tpm_budget, self.rpd_limit)
    }

    /// Backoff for failed remote calls
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_wait_time)
    }

    /// Fan-out sizing for document batches
    #[must_use]
    pub fn fanout(&self) -> FanoutCoordinator {
        FanoutCoordinator::new(self.max_parallel_documents, self.sequential_threshold)
    }

    /// These settings applied to a batch of `document_count` documents.
    ///
    /// Uses the default page estimate if `avg_pages` is `None`.
    #[must_use]
    pub fn proposed(&self, document_count: usize, avg_pages: Option<usize>) -> ProposedConfig {
        ProposedConfig {
            page_concurrency: self.page_concurrency,
            document_count,
            rpm_limit: self.rpm_limit,
            tpm_budget: self.tpm_budget,
            rpd_limit: self.rpd_limit,
            global_limit: self.global_limit,
            avg_pages_per_document: avg_pages.unwrap_or(DEFAULT_AVG_PAGES),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: QuotaConfig = toml::from_str("").unwrap();
        assert_eq!(config, QuotaConfig::default());
        assert_eq!(config.global_limit, 200);
        assert_eq!(config.drain_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_partial_config() {
        let config: QuotaConfig = toml::from_str(
            r#"
            global_limit = 20
            rpm_limit = 60
            drain_timeout = "30s"
            retry_wait_time = "250ms"
            "#,
        )
        .unwrap();

        assert_eq!(config.global_limit, 20);
        assert_eq!(config.rpm_limit, 60);
        assert_eq!(config.drain_timeout, Duration::from_secs(30));
        assert_eq!(config.retry_wait_time, Duration::from_millis(250));
        assert_eq!(config.page_concurrency, 50);
        assert_eq!(config.rate_limit(), RateLimitConfig::new(60, 2_000_000, 10_000));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(toml::from_str::<QuotaConfig>("concurrency = 4").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "page_concurrency = 8").unwrap();

        let config = QuotaConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.page_concurrency, 8);
    }

    #[test]
    fn test_load_errors() {
        let missing = QuotaConfig::load_from_file(Path::new("does-not-exist.toml"));
        assert!(matches!(missing, Err(ErrorKind::ReadConfig { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "global_limit = \"many\"").unwrap();
        let invalid = QuotaConfig::load_from_file(file.path());
        assert!(matches!(invalid, Err(ErrorKind::ParseConfig { .. })));
    }

    #[test]
    fn test_proposed() {
        let proposed = QuotaConfig::default().proposed(10, None);
        assert_eq!(proposed, ProposedConfig::new(50, 10));
        assert_eq!(
            QuotaConfig::default().proposed(2, Some(7)).avg_pages_per_document,
            7
        );
    }
}
