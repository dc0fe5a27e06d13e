use log::debug;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{DocumentId, ErrorKind, Result};

/// Default number of pages of one document in flight at once
pub const DEFAULT_PAGE_CONCURRENCY: usize = 50;

/// Bounds how many page units of a single document run concurrently.
///
/// Each document job gets its own limiter. Page units take a slot here
/// before they ask the [`ConcurrencyGovernor`](super::ConcurrencyGovernor)
/// for a global one.
#[derive(Debug)]
pub struct DocumentLimiter {
    document: DocumentId,
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

impl DocumentLimiter {
    /// Create a limiter for `document` allowing `capacity` concurrent pages
    ///
    /// # Errors
    ///
    /// Returns an error if `capacity` is zero.
    pub fn new(document: DocumentId, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ErrorKind::InvalidCapacity {
                what: "document",
                value: capacity,
            });
        }
        Ok(Self {
            document,
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        })
    }

    /// Wait for a page slot of this document.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::DocumentCancelled`] if the document was closed
    /// before or while waiting.
    pub async fn acquire(&self) -> Result<DocumentPermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ErrorKind::DocumentCancelled(self.document.clone()))?;
        Ok(DocumentPermit { _permit: permit })
    }

    /// Abort the document.
    ///
    /// Pending and future acquisitions fail. Permits already handed out stay
    /// valid until dropped.
    pub fn close(&self) {
        debug!("Closing page limiter of document {}", self.document);
        self.semaphore.close();
    }

    /// Whether [`DocumentLimiter::close`] was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// The document this limiter belongs to
    #[must_use]
    pub const fn document(&self) -> &DocumentId {
        &self.document
    }

    /// Configured number of concurrent pages
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free page slots
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Page slots currently taken
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }
}

/// A page slot of a [`DocumentLimiter`], returned on drop
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct DocumentPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert_eq!(
            DocumentLimiter::new("a.pdf".into(), 0).unwrap_err(),
            ErrorKind::InvalidCapacity {
                what: "document",
                value: 0
            }
        );
    }

    #[tokio::test]
    async fn test_limits_pages() {
        let limiter = DocumentLimiter::new("a.pdf".into(), 2).unwrap();
        let _first = limiter.acquire().await.unwrap();
        let _second = limiter.acquire().await.unwrap();
        assert_eq!(limiter.in_flight(), 2);
        assert_eq!(limiter.available(), 0);

        let third = tokio::time::timeout(Duration::from_millis(10), limiter.acquire()).await;
        assert!(third.is_err());
    }

    #[tokio::test]
    async fn test_close_cancels_waiters() {
        let limiter = Arc::new(DocumentLimiter::new("a.pdf".into(), 1).unwrap());
        let held = limiter.acquire().await.unwrap();

        let waiter = tokio::spawn({
            let limiter = Arc::clone(&limiter);
            async move { limiter.acquire().await.map(|_| ()) }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        limiter.close();
        assert_eq!(
            waiter.await.unwrap(),
            Err(ErrorKind::DocumentCancelled("a.pdf".into()))
        );
        assert!(limiter.is_closed());

        // Held permits are unaffected and still release
        assert_eq!(limiter.in_flight(), 1);
        drop(held);
        assert_eq!(limiter.in_flight(), 0);
        assert!(limiter.acquire().await.is_err());
    }
}
