//! Static checks and recommendations for concurrency settings.
//!
//! Nothing in here touches a live limiter. The functions look at a proposed
//! configuration and report what would go wrong when it runs.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::concurrency::{DEFAULT_GLOBAL_LIMIT, DEFAULT_PAGE_CONCURRENCY};
use crate::ratelimit::{DEFAULT_RPD_LIMIT, DEFAULT_RPM_LIMIT, DEFAULT_TPM_BUDGET};
use crate::{ErrorKind, Result};

/// Pages per document assumed when nothing better is known
pub const DEFAULT_AVG_PAGES: usize = 50;

/// Page concurrency above which the remote service tends to throttle
const HIGH_PAGE_CONCURRENCY: usize = 100;

/// Batch size above which splitting the batch is advisable
const LARGE_BATCH: usize = 10;

/// Share of the daily request budget a single batch may use up
const DAILY_BUDGET_SHARE: f64 = 0.8;

/// A set of concurrency settings about to be used for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedConfig {
    /// Pages in flight per document
    pub page_concurrency: usize,
    /// Documents in the batch
    pub document_count: usize,
    /// Requests per minute allowed by the remote service
    pub rpm_limit: u64,
    /// Tokens per minute allowed by the remote service
    pub tpm_budget: u64,
    /// Requests per day allowed by the remote service
    pub rpd_limit: u64,
    /// Capacity of the global concurrency governor
    pub global_limit: usize,
    /// Expected pages per document
    pub avg_pages_per_document: usize,
}

impl ProposedConfig {
    /// Settings for `document_count` documents, with defaults for the rest
    #[must_use]
    pub const fn new(page_concurrency: usize, document_count: usize) -> Self {
        Self {
            page_concurrency,
            document_count,
            rpm_limit: DEFAULT_RPM_LIMIT,
            tpm_budget: DEFAULT_TPM_BUDGET,
            rpd_limit: DEFAULT_RPD_LIMIT,
            global_limit: DEFAULT_GLOBAL_LIMIT,
            avg_pages_per_document: DEFAULT_AVG_PAGES,
        }
    }
}

impl Default for ProposedConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_CONCURRENCY, 1)
    }
}

/// Outcome of [`validate_config`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Validation {
    /// `false` if the configuration must not be used as is
    pub ok: bool,
    /// Findings in rule order, including the ones that made `ok` false
    pub warnings: Vec<String>,
}

impl Validation {
    /// Turn a failed validation into an error.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Configuration`] carrying all findings if the
    /// validation failed.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.ok {
            Ok(self.warnings)
        } else {
            Err(ErrorKind::Configuration {
                warnings: self.warnings,
            })
        }
    }

    fn error(&mut self, message: String) {
        self.ok = false;
        self.warnings.push(message);
    }

    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }
}

/// Check a proposed configuration.
///
/// A batch expected to use up most of the daily request budget, or a limit
/// of zero, fails validation. Settings that merely oversubscribe the global
/// limit only produce a warning, since the governor will cap them at
/// runtime anyway.
#[must_use]
pub fn validate_config(config: &ProposedConfig) -> Validation {
    let mut validation = Validation {
        ok: true,
        warnings: Vec::new(),
    };

    for (field, value) in [
        ("page_concurrency", config.page_concurrency as u64),
        ("global_limit", config.global_limit as u64),
        ("rpm_limit", config.rpm_limit),
        ("tpm_budget", config.tpm_budget),
        ("rpd_limit", config.rpd_limit),
    ] {
        if value == 0 {
            validation.error(format!("`{field}` must be at least 1"));
        }
    }

    let expected_requests = config
        .document_count
        .saturating_mul(config.avg_pages_per_document);
    #[allow(clippy::cast_precision_loss)]
    let near_daily_limit = expected_requests as f64 > config.rpd_limit as f64 * DAILY_BUDGET_SHARE;
    if near_daily_limit {
        validation.error(format!(
            "Expected total requests ({expected_requests}) close to the daily limit ({}). Split the batch or raise the daily limit.",
            config.rpd_limit
        ));
    }

    if config.page_concurrency > HIGH_PAGE_CONCURRENCY {
        validation.warn(format!(
            "Page concurrency ({}) is high and may trigger throttling. Consider 50 or less.",
            config.page_concurrency
        ));
    }

    if config.document_count > LARGE_BATCH {
        validation.warn(format!(
            "Many documents ({}) in one batch. Consider processing them in smaller batches.",
            config.document_count
        ));
    }

    let theoretical_max = config
        .page_concurrency
        .saturating_mul(config.document_count);
    if theoretical_max > config.global_limit {
        validation.warn(format!(
            "Theoretical maximum concurrency ({theoretical_max}) exceeds the global limit ({}). Actual concurrency will be capped at {}.",
            config.global_limit, config.global_limit
        ));
    }

    validation
}

/// Size class of a batch, by total pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WorkloadTier {
    /// Fewer than 100 pages
    Small,
    /// Fewer than 500 pages
    Medium,
    /// Everything else
    Large,
}

/// Recommended concurrency settings for a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyPlan {
    /// Capacity for the global governor
    pub global_limit: usize,
    /// Pages in flight per document
    pub per_document_limit: usize,
    /// Documents processed side by side
    pub max_parallel_documents: usize,
    /// Size class the recommendation is based on
    pub workload: WorkloadTier,
    /// Human-readable summary of the inputs
    pub reasoning: String,
}

/// Recommend settings for `document_count` documents of `avg_pages` pages.
///
/// The rate limit is not used to size the plan, because the rate limiter
/// enforces it at runtime. It only shows up in the reasoning.
#[must_use]
pub fn recommend_plan(document_count: usize, avg_pages: usize, rpm_limit: u64) -> ConcurrencyPlan {
    let total_pages = document_count.saturating_mul(avg_pages);

    let (workload, per_document_limit, max_parallel_documents) = match total_pages {
        0..100 => (
            WorkloadTier::Small,
            total_pages.min(50),
            document_count.min(5),
        ),
        100..500 => (WorkloadTier::Medium, 30, document_count.min(3)),
        _ => (WorkloadTier::Large, 20, document_count.min(2)),
    };
    let per_document_limit = per_document_limit.max(1);
    let max_parallel_documents = max_parallel_documents.max(1);

    ConcurrencyPlan {
        global_limit: (per_document_limit * max_parallel_documents)
            .min(DEFAULT_GLOBAL_LIMIT)
            .max(1),
        per_document_limit,
        max_parallel_documents,
        workload,
        reasoning: format!(
            "{workload} workload: {total_pages} pages in total at {rpm_limit} requests per minute"
        ),
    }
}

/// Scale page concurrency down until the batch fits the limits.
///
/// Returns `(page_concurrency, document_count)`. The product of both first
/// has to fit into `global_limit`, then into half the per-minute budget.
/// Page concurrency never drops below 1 and the document count is never
/// changed.
#[must_use]
pub fn safe_concurrency(
    page_concurrency: usize,
    document_count: usize,
    rpm_limit: u64,
    global_limit: usize,
) -> (usize, usize) {
    let mut page = page_concurrency.max(1);
    let documents = document_count;

    let theoretical_max = page.saturating_mul(documents);
    if theoretical_max > global_limit {
        page = (page * global_limit / theoretical_max).max(1);
    }

    let safe_rpm = usize::try_from((rpm_limit / 2).max(1)).unwrap_or(usize::MAX);
    let planned = page.saturating_mul(documents);
    if planned > safe_rpm {
        page = (page * safe_rpm / planned).max(1);
    }

    (page, documents)
}
