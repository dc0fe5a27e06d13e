use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::debug;
use std::future::Future;
use std::sync::Arc;

use crate::concurrency::{
    ConcurrencyGovernor, ConcurrencyStats, DocumentLimiter, DocumentPermit, GlobalPermit,
};
use crate::ratelimit::{RateLimiter, RateUsage};
use crate::{DocumentId, ErrorKind, QuotaConfig, Result};

/// Single entry point for calls to the remote service.
///
/// Combines the three scopes a call has to pass, in a fixed order:
///
/// 1. a page slot of its document ([`DocumentLimiter`])
/// 2. a process-wide slot ([`ConcurrencyGovernor`])
/// 3. the rolling quota budgets ([`RateLimiter`])
///
/// Document limiters are created on first use and live until the document
/// is finished or cancelled. Clones share all state.
///
/// # Examples
///
/// ```
/// use quotaflow_lib::{Dispatcher, DocumentId, QuotaConfig};
///
/// # #[tokio::main]
/// # async fn main() -> quotaflow_lib::Result<()> {
/// let dispatcher = Dispatcher::new(&QuotaConfig::default())?;
/// let document = DocumentId::from("lecture-01.pdf");
///
/// let page = dispatcher
///     .execute(&document, 1_000, || async { "page 1 as html" })
///     .await?;
/// assert_eq!(page, "page 1 as html");
///
/// dispatcher.finish_document(&document);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Dispatcher {
    governor: ConcurrencyGovernor,
    rate_limiter: Arc<RateLimiter>,
    documents: Arc<DashMap<DocumentId, Arc<DocumentLimiter>>>,
    page_concurrency: usize,
}

impl Dispatcher {
    /// Create a dispatcher from a configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any limit in `config` is zero.
    pub fn new(config: &QuotaConfig) -> Result<Self> {
        let governor =
            ConcurrencyGovernor::with_drain_timeout(config.global_limit, config.drain_timeout)?;
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit())?);
        Self::from_parts(governor, rate_limiter, config.page_concurrency)
    }

    /// Create a dispatcher around an existing governor and rate limiter.
    ///
    /// Use this to share one governor, one quota, or both between several
    /// dispatchers.
    ///
    /// # Errors
    ///
    /// Returns an error if `page_concurrency` is zero.
    pub fn from_parts(
        governor: ConcurrencyGovernor,
        rate_limiter: Arc<RateLimiter>,
        page_concurrency: usize,
    ) -> Result<Self> {
        if page_concurrency == 0 {
            return Err(ErrorKind::InvalidCapacity {
                what: "document",
                value: page_concurrency,
            });
        }
        Ok(Self {
            governor,
            rate_limiter,
            documents: Arc::new(DashMap::new()),
            page_concurrency,
        })
    }

    /// Run `op` once a call for `document` passes all three scopes.
    ///
    /// The global slot is labeled with the document, so running calls show
    /// up in [`ConcurrencyGovernor::active_requests`].
    ///
    /// Slots are released in reverse order as soon as `op` completes or the
    /// returned future is dropped. Whatever `op` returns is passed through
    /// unchanged, including its errors.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::DocumentCancelled`](crate::ErrorKind::DocumentCancelled)
    /// if the document is cancelled while the call waits for a page slot.
    pub async fn execute<T, F, Fut>(&self, document: &DocumentId, cost: i64, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let document_permit = self.acquire_document_slot(document).await?;
        let global_permit = self.governor.acquire_labeled(document.to_string()).await;
        self.gate_rate(cost).await;

        let output = op().await;

        drop(global_permit);
        drop(document_permit);
        Ok(output)
    }

    /// Take a process-wide slot
    pub async fn acquire_global_slot(&self) -> GlobalPermit {
        self.governor.acquire().await
    }

    /// Take a page slot of `document`, creating its limiter if needed
    ///
    /// # Errors
    ///
    /// Returns an error if the document is cancelled while waiting.
    pub async fn acquire_document_slot(&self, document: &DocumentId) -> Result<DocumentPermit> {
        self.document_limiter(document)?.acquire().await
    }

    /// Wait until a call of `estimated_token_cost` fits into the quota
    pub async fn gate_rate(&self, estimated_token_cost: i64) {
        self.rate_limiter.wait_for_slot(estimated_token_cost).await;
    }

    /// Change the global concurrency limit.
    ///
    /// See [`ConcurrencyGovernor::adjust_limit`].
    ///
    /// # Errors
    ///
    /// Returns an error if `new_value` is zero.
    pub async fn adjust_global_limit(&self, new_value: usize, wait_for_drain: bool) -> Result<()> {
        self.governor.adjust_limit(new_value, wait_for_drain).await
    }

    /// Snapshot of the global admission statistics
    #[must_use]
    pub fn stats(&self) -> ConcurrencyStats {
        self.governor.stats()
    }

    /// Snapshot of the quota usage
    #[must_use]
    pub fn rate_usage(&self) -> RateUsage {
        self.rate_limiter.usage()
    }

    /// Give `document` a page limit different from the default.
    ///
    /// Has no effect on a document that already has a limiter.
    ///
    /// # Errors
    ///
    /// Returns an error if `page_concurrency` is zero.
    pub fn register_document(&self, document: DocumentId, page_concurrency: usize) -> Result<()> {
        if let Entry::Vacant(entry) = self.documents.entry(document.clone()) {
            entry.insert(Arc::new(DocumentLimiter::new(document, page_concurrency)?));
        }
        Ok(())
    }

    /// Forget the limiter of a completed document.
    ///
    /// The limiter is kept while any page unit of the document holds or
    /// waits for a slot, so a later call for the same document cannot run
    /// next to them under a fresh limiter. Returns `true` if the limiter was
    /// dropped.
    pub fn finish_document(&self, document: &DocumentId) -> bool {
        self.documents
            .remove_if(document, |_, limiter| {
                // The map holds the only reference unless a page unit is
                // still inside `acquire_document_slot`
                limiter.in_flight() == 0 && Arc::strong_count(limiter) == 1
            })
            .is_some()
    }

    /// Abort a document.
    ///
    /// Page units waiting for a slot of this document fail. Page units
    /// already running are left alone.
    pub fn cancel_document(&self, document: &DocumentId) -> bool {
        match self.documents.remove(document) {
            Some((_, limiter)) => {
                limiter.close();
                true
            }
            None => false,
        }
    }

    /// Documents that currently have a limiter
    #[must_use]
    pub fn active_documents(&self) -> usize {
        self.documents.len()
    }

    /// The shared governor
    #[must_use]
    pub const fn governor(&self) -> &ConcurrencyGovernor {
        &self.governor
    }

    /// The shared rate limiter
    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Get the limiter of `document` or create one with the default limit
    fn document_limiter(&self, document: &DocumentId) -> Result<Arc<DocumentLimiter>> {
        if let Some(limiter) = self.documents.get(document) {
            return Ok(limiter.clone());
        }

        let limiter = Arc::new(DocumentLimiter::new(
            document.clone(),
            self.page_concurrency,
        )?);

        match self.documents.entry(document.clone()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                debug!("Created page limiter for document {document}");
                Ok(entry.insert(limiter).clone())
            }
        }
    }
}
