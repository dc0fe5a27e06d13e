//! `quotaflow` coordinates concurrent calls to a quota-limited remote service.
//!
//! A call passes three scopes before it runs: a page slot of its document,
//! a process-wide slot and the rolling request and token budgets of the
//! service. The [`Dispatcher`] ties them together:
//!
//! ```
//! use quotaflow_lib::{Dispatcher, DocumentId, QuotaConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let dispatcher = Dispatcher::new(&QuotaConfig::default())?;
//!   let document = DocumentId::from("lecture-01.pdf");
//!   let html = dispatcher
//!       .execute(&document, 2_000, || async { "<p>slide</p>" })
//!       .await?;
//!   assert_eq!(html, "<p>slide</p>");
//!   Ok(())
//! }
//! ```
//!
//! Before a batch starts, [`validate::validate_config`] and
//! [`validate::recommend_plan`] tell whether the settings fit the quota:
//!
//! ```
//! use quotaflow_lib::validate::{validate_config, ProposedConfig};
//!
//! let validation = validate_config(&ProposedConfig::new(50, 10));
//! assert!(validation.ok);
//! assert_eq!(validation.warnings.len(), 1);
//! ```
// #![deny(missing_docs)]

mod dispatcher;
mod types;

pub mod concurrency;
pub mod ratelimit;
pub mod retry;
pub mod validate;

pub use dispatcher::Dispatcher;
pub use types::*;
