use futures::StreamExt;
use futures::stream;
use log::debug;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Up to this many documents are processed one after another
pub const DEFAULT_SEQUENTIAL_THRESHOLD: usize = 3;

/// Default upper bound of documents processed in parallel
pub const DEFAULT_MAX_PARALLEL_DOCUMENTS: usize = 5;

/// Document size at which no size penalty applies
const REFERENCE_PAGES: usize = 50;

/// Shape of a batch of documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    /// Number of documents in the batch
    pub document_count: usize,
    /// Pages in flight per document
    pub per_document_limit: usize,
    /// Average number of pages per document
    pub avg_pages_per_document: usize,
}

/// Decides how many documents of a batch are processed at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanoutCoordinator {
    max_parallel_documents: usize,
    sequential_threshold: usize,
}

impl Default for FanoutCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PARALLEL_DOCUMENTS, DEFAULT_SEQUENTIAL_THRESHOLD)
    }
}

impl FanoutCoordinator {
    /// Create a coordinator. A `max_parallel_documents` of zero is treated
    /// as one.
    #[must_use]
    pub fn new(max_parallel_documents: usize, sequential_threshold: usize) -> Self {
        Self {
            max_parallel_documents: max_parallel_documents.max(1),
            sequential_threshold,
        }
    }

    /// Number of documents to process concurrently, at least one.
    ///
    /// Small batches run sequentially. Otherwise the result is bounded by
    /// the configured maximum, the batch size and how many documents fit
    /// into `available_global` slots. Documents larger than the reference
    /// size scale it down further.
    #[must_use]
    pub fn parallelism(&self, workload: &Workload, available_global: usize) -> usize {
        if workload.document_count <= self.sequential_threshold {
            return 1;
        }

        let safe_workers = (available_global / workload.per_document_limit.max(1)).max(1);
        let mut workers = self
            .max_parallel_documents
            .min(workload.document_count)
            .min(safe_workers);

        if workload.avg_pages_per_document > REFERENCE_PAGES {
            workers = workers * REFERENCE_PAGES / workload.avg_pages_per_document;
        }

        workers.max(1)
    }

    /// Run `f` for every document with at most
    /// [`FanoutCoordinator::parallelism`] of them in flight
    pub async fn run<D, F, Fut>(
        &self,
        documents: Vec<D>,
        workload: &Workload,
        available_global: usize,
        f: F,
    ) where
        F: FnMut(D) -> Fut,
        Fut: Future<Output = ()>,
    {
        let workers = self.parallelism(workload, available_global);
        debug!(
            "Processing {} documents with {workers} in parallel",
            documents.len()
        );
        stream::iter(documents).for_each_concurrent(workers, f).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn workload(documents: usize, per_document: usize, pages: usize) -> Workload {
        Workload {
            document_count: documents,
            per_document_limit: per_document,
            avg_pages_per_document: pages,
        }
    }

    #[rstest]
    #[case::single(workload(1, 50, 10), 200, 1)]
    #[case::at_threshold(workload(3, 50, 10), 200, 1)]
    #[case::bounded_by_max(workload(20, 10, 10), 200, 5)]
    #[case::bounded_by_documents(workload(4, 10, 10), 200, 4)]
    #[case::bounded_by_global(workload(10, 50, 10), 100, 2)]
    #[case::global_exhausted(workload(10, 50, 10), 0, 1)]
    #[case::large_documents(workload(10, 10, 100), 200, 2)]
    #[case::huge_documents(workload(10, 10, 1000), 200, 1)]
    #[case::reference_size(workload(10, 10, 50), 200, 5)]
    fn test_parallelism(
        #[case] workload: Workload,
        #[case] available: usize,
        #[case] expected: usize,
    ) {
        assert_eq!(
            FanoutCoordinator::default().parallelism(&workload, available),
            expected
        );
    }

    #[test]
    fn test_zero_per_document_limit() {
        assert_eq!(
            FanoutCoordinator::default().parallelism(&workload(10, 0, 10), 3),
            3
        );
    }

    #[tokio::test]
    async fn test_run_respects_parallelism() {
        let current = Arc::new(AtomicUsize::new(0));
        let observed_max = Arc::new(AtomicUsize::new(0));
        let processed = Arc::new(AtomicUsize::new(0));

        let documents: Vec<usize> = (0..12).collect();
        FanoutCoordinator::default()
            .run(documents, &workload(12, 10, 10), 30, |_| {
                let current = Arc::clone(&current);
                let observed_max = Arc::clone(&observed_max);
                let processed = Arc::clone(&processed);
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    observed_max.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    processed.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        assert_eq!(processed.load(Ordering::SeqCst), 12);
        assert!(observed_max.load(Ordering::SeqCst) <= 3);
    }
}
