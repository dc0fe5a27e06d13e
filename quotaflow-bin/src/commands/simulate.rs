use anyhow::Result;
use futures::future::join_all;
use log::{info, warn};
use quotaflow_lib::concurrency::{ConcurrencyStats, Workload};
use quotaflow_lib::ratelimit::{RateUsage, estimate_tokens};
use quotaflow_lib::retry::Retryable;
use quotaflow_lib::{Dispatcher, DocumentId, ErrorKind, QuotaConfig};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Characters on an average page, used when no cost is given
const AVERAGE_PAGE_CHARS: usize = 3_000;

/// Shape of a synthetic batch
#[derive(Debug, Clone, Copy)]
pub(crate) struct Simulation {
    pub(crate) documents: usize,
    pub(crate) pages: usize,
    pub(crate) latency: Duration,
    pub(crate) cost: Option<i64>,
    pub(crate) fail_every: Option<u64>,
}

/// Outcome of a simulation run
#[derive(Debug, Serialize)]
pub(crate) struct SimulationReport {
    pub(crate) documents: usize,
    pub(crate) pages_per_document: usize,
    pub(crate) parallel_documents: usize,
    pub(crate) completed_pages: u64,
    pub(crate) failed_pages: u64,
    pub(crate) elapsed_ms: u128,
    pub(crate) stats: ConcurrencyStats,
    pub(crate) rate_usage: RateUsage,
}

#[derive(Debug)]
enum CallError {
    /// The fake service turned the call down
    Overloaded,
    /// The page never got a slot
    Dispatch(ErrorKind),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overloaded => write!(f, "service overloaded"),
            Self::Dispatch(e) => write!(f, "not dispatched: {e}"),
        }
    }
}

impl Retryable for CallError {
    fn should_retry(&self) -> bool {
        matches!(self, Self::Overloaded)
    }
}

/// Push a synthetic batch through a [`Dispatcher`] configured by `config`
pub(crate) async fn simulate(config: &QuotaConfig, simulation: Simulation) -> Result<SimulationReport> {
    let dispatcher = Dispatcher::new(config)?;
    let retry = config.retry_policy();
    let fanout = config.fanout();
    let cost = simulation
        .cost
        .unwrap_or_else(|| estimate_tokens(AVERAGE_PAGE_CHARS, 1));
    let Simulation {
        latency,
        fail_every,
        ..
    } = simulation;

    let workload = Workload {
        document_count: simulation.documents,
        per_document_limit: config.page_concurrency,
        avg_pages_per_document: simulation.pages,
    };
    let available = dispatcher.governor().available();
    let parallel_documents = fanout.parallelism(&workload, available);
    info!(
        "Simulating {} documents of {} pages, {parallel_documents} at a time",
        simulation.documents, simulation.pages
    );

    let calls = &AtomicU64::new(0);
    let completed = &AtomicU64::new(0);
    let failed = &AtomicU64::new(0);
    let dispatcher = &dispatcher;
    let start = Instant::now();

    let documents: Vec<DocumentId> = (1..=simulation.documents)
        .map(|n| DocumentId::from(format!("document-{n}")))
        .collect();

    fanout
        .run(documents, &workload, available, move |document| async move {
            let document = &document;
            let pages = (1..=simulation.pages).map(move |page| async move {
                let result = retry
                    .run(move || async move {
                        match dispatcher
                            .execute(document, cost, || fake_call(calls, latency, fail_every))
                            .await
                        {
                            Ok(outcome) => outcome,
                            Err(e) => Err(CallError::Dispatch(e)),
                        }
                    })
                    .await;

                match result {
                    Ok(()) => completed.fetch_add(1, Ordering::Relaxed),
                    Err(e) => {
                        warn!("Page {} failed: {e}", document.page_label(page));
                        failed.fetch_add(1, Ordering::Relaxed)
                    }
                };
            });
            join_all(pages).await;
            dispatcher.finish_document(document);
        })
        .await;

    Ok(SimulationReport {
        documents: simulation.documents,
        pages_per_document: simulation.pages,
        parallel_documents,
        completed_pages: completed.load(Ordering::Relaxed),
        failed_pages: failed.load(Ordering::Relaxed),
        elapsed_ms: start.elapsed().as_millis(),
        stats: dispatcher.stats(),
        rate_usage: dispatcher.rate_usage(),
    })
}

/// Stand-in for the remote service
async fn fake_call(
    calls: &AtomicU64,
    latency: Duration,
    fail_every: Option<u64>,
) -> std::result::Result<(), CallError> {
    let call = calls.fetch_add(1, Ordering::Relaxed) + 1;
    tokio::time::sleep(latency).await;
    match fail_every {
        Some(n) if n > 0 && call % n == 0 => Err(CallError::Overloaded),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn simulation(documents: usize, pages: usize) -> Simulation {
        Simulation {
            documents,
            pages,
            latency: Duration::from_millis(1),
            cost: Some(100),
            fail_every: None,
        }
    }

    #[test]
    fn test_call_error_display() {
        assert_eq!(CallError::Overloaded.to_string(), "service overloaded");

        let cancelled = ErrorKind::DocumentCancelled(DocumentId::from("a.pdf"));
        let expected = format!("not dispatched: {cancelled}");
        assert_eq!(CallError::Dispatch(cancelled).to_string(), expected);
    }

    #[tokio::test]
    async fn test_simulation_respects_global_limit() {
        let config = QuotaConfig {
            global_limit: 2,
            page_concurrency: 5,
            ..QuotaConfig::default()
        };
        let report = simulate(&config, simulation(4, 5)).await.unwrap();

        assert_eq!(report.completed_pages, 20);
        assert_eq!(report.failed_pages, 0);
        assert_eq!(report.stats.total_requests, 20);
        assert!(report.stats.peak_requests <= 2);
        assert_eq!(report.rate_usage.requests_last_minute, 20);
        assert_eq!(report.rate_usage.tokens_last_minute, 2000);
    }

    #[tokio::test]
    async fn test_failed_calls_are_retried() {
        let config = QuotaConfig {
            retry_wait_time: Duration::from_millis(1),
            ..QuotaConfig::default()
        };
        let report = simulate(
            &config,
            Simulation {
                fail_every: Some(3),
                ..simulation(1, 6)
            },
        )
        .await
        .unwrap();

        assert_eq!(report.completed_pages, 6);
        assert_eq!(report.failed_pages, 0);
        assert!(report.stats.total_requests > 6);
    }

    #[tokio::test]
    async fn test_exhausted_retries_count_as_failed() {
        let config = QuotaConfig {
            max_retries: 0,
            ..QuotaConfig::default()
        };
        let report = simulate(
            &config,
            Simulation {
                fail_every: Some(1),
                ..simulation(1, 3)
            },
        )
        .await
        .unwrap();

        assert_eq!(report.completed_pages, 0);
        assert_eq!(report.failed_pages, 3);
    }
}
