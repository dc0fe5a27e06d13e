//! Admission control for concurrent calls.
//!
//! Two nested scopes bound how many calls run at once:
//!
//! - [`ConcurrencyGovernor`]: one process-wide pool of slots shared by all
//!   documents
//! - [`DocumentLimiter`]: pages in flight for a single document
//!
//! [`FanoutCoordinator`] decides how many documents run side by side so the
//! two scopes fit together.

mod document;
mod fanout;
mod governor;
mod stats;

pub use document::{DEFAULT_PAGE_CONCURRENCY, DocumentLimiter, DocumentPermit};
pub use fanout::{
    DEFAULT_MAX_PARALLEL_DOCUMENTS, DEFAULT_SEQUENTIAL_THRESHOLD, FanoutCoordinator, Workload,
};
pub use governor::{
    ConcurrencyGovernor, DEFAULT_DRAIN_TIMEOUT, DEFAULT_GLOBAL_LIMIT, GlobalPermit,
};
pub use stats::ConcurrencyStats;
