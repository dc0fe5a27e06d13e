use serde::{Serialize, Serializer};
use std::path::PathBuf;
use thiserror::Error;

use crate::DocumentId;

/// Possible errors when interacting with `quotaflow_lib`
///
/// Quota contention is deliberately absent: it is always resolved by waiting.
/// Errors raised by the guarded remote call never pass through this type.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A capacity of zero was requested for a limiter
    #[error("Invalid {what} capacity `{value}`: capacity must be at least 1")]
    InvalidCapacity {
        /// Which limiter rejected the value
        what: &'static str,
        /// The rejected value
        value: usize,
    },

    /// A rate budget of zero was configured
    #[error("Invalid rate limit: `{field}` must be at least 1")]
    InvalidRateLimit {
        /// Name of the offending field
        field: &'static str,
    },

    /// The proposed configuration is unsafe to run
    #[error("Unsafe concurrency configuration: {}", .warnings.join("; "))]
    Configuration {
        /// All findings of the validator, in rule order
        warnings: Vec<String>,
    },

    /// The document was cancelled while a page unit waited for a slot
    #[error("Document `{0}` was cancelled")]
    DocumentCancelled(DocumentId),

    /// The configuration file could not be read
    #[error("Cannot read configuration file `{}`: {source}", .path.display())]
    ReadConfig {
        /// Path of the configuration file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this crate
    #[error("Cannot parse configuration file `{}`: {source}", .path.display())]
    ParseConfig {
        /// Path of the configuration file
        path: PathBuf,
        /// Underlying deserialization error
        #[source]
        source: toml::de::Error,
    },
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::InvalidCapacity { what: w1, value: v1 },
                Self::InvalidCapacity { what: w2, value: v2 },
            ) => w1 == w2 && v1 == v2,
            (Self::InvalidRateLimit { field: f1 }, Self::InvalidRateLimit { field: f2 }) => {
                f1 == f2
            }
            (Self::Configuration { warnings: w1 }, Self::Configuration { warnings: w2 }) => {
                w1 == w2
            }
            (Self::DocumentCancelled(d1), Self::DocumentCancelled(d2)) => d1 == d2,
            (Self::ReadConfig { path: p1, source: e1 }, Self::ReadConfig { path: p2, source: e2 }) => {
                p1 == p2 && e1.kind() == e2.kind()
            }
            (Self::ParseConfig { path: p1, .. }, Self::ParseConfig { path: p2, .. }) => p1 == p2,
            _ => false,
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_lists_warnings() {
        let error = ErrorKind::Configuration {
            warnings: vec!["first".to_string(), "second".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Unsafe concurrency configuration: first; second"
        );
    }

    #[test]
    fn test_invalid_capacity_message() {
        let error = ErrorKind::InvalidCapacity {
            what: "global",
            value: 0,
        };
        assert!(error.to_string().contains("global capacity `0`"));
    }

    #[test]
    fn test_error_equality_ignores_io_details() {
        let e1 = ErrorKind::ReadConfig {
            path: PathBuf::from("quotaflow.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "a"),
        };
        let e2 = ErrorKind::ReadConfig {
            path: PathBuf::from("quotaflow.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "b"),
        };
        assert_eq!(e1, e2);
    }
}
