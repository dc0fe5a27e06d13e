#![allow(unreachable_pub)]

mod config;
mod document_id;
mod error;

pub use config::QuotaConfig;
pub use document_id::DocumentId;
pub use error::ErrorKind;

/// The quotaflow `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
