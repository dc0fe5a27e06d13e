use serde::Serialize;
use serde::ser::SerializeStruct;
use std::time::{Duration, Instant};

/// Record and report admission statistics of a
/// [`crate::concurrency::ConcurrencyGovernor`].
///
/// The governor mutates these counters under its lock. What callers get from
/// [`crate::concurrency::ConcurrencyGovernor::stats`] is a copy and may be
/// stale by the time it is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyStats {
    /// Calls currently holding a global slot
    pub current_requests: usize,
    /// Highest value `current_requests` reached
    pub peak_requests: usize,
    /// Calls admitted in total
    pub total_requests: u64,
    /// Admissions that had to wait for a slot
    pub blocked_requests: u64,
    /// When counting started
    pub last_reset: Instant,
}

impl Default for ConcurrencyStats {
    fn default() -> Self {
        Self {
            current_requests: 0,
            peak_requests: 0,
            total_requests: 0,
            blocked_requests: 0,
            last_reset: Instant::now(),
        }
    }
}

impl ConcurrencyStats {
    /// Record an admission
    pub(crate) fn record_acquire(&mut self) {
        self.current_requests += 1;
        self.total_requests += 1;
        self.peak_requests = self.peak_requests.max(self.current_requests);
    }

    /// Record a release.
    ///
    /// Returns `false` (and changes nothing) if no call was being tracked.
    pub(crate) const fn record_release(&mut self) -> bool {
        if self.current_requests == 0 {
            return false;
        }
        self.current_requests -= 1;
        true
    }

    /// Record an admission that could not proceed immediately.
    ///
    /// Returns the new number of blocked admissions.
    pub(crate) const fn record_blocked(&mut self) -> u64 {
        self.blocked_requests += 1;
        self.blocked_requests
    }

    /// Start counting again, keeping calls that are still in flight
    pub(crate) fn reset(&mut self) {
        *self = Self {
            current_requests: self.current_requests,
            peak_requests: self.current_requests,
            ..Self::default()
        };
    }

    /// Time since counting started
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.last_reset.elapsed()
    }

    /// Share of admissions that had to wait (0.0 to 1.0)
    #[must_use]
    pub fn blocked_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let rate = self.blocked_requests as f64 / self.total_requests as f64;
            rate
        }
    }

    /// Get human-readable summary of the stats
    #[must_use]
    pub fn summary(&self) -> String {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let blocked_pct = (self.blocked_rate() * 100.0) as u64;
        format!(
            "{} requests ({} in flight, peak {}), {}% blocked",
            self.total_requests, self.current_requests, self.peak_requests, blocked_pct
        )
    }
}

impl Serialize for ConcurrencyStats {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("ConcurrencyStats", 6)?;
        s.serialize_field("current_requests", &self.current_requests)?;
        s.serialize_field("peak_requests", &self.peak_requests)?;
        s.serialize_field("total_requests", &self.total_requests)?;
        s.serialize_field("blocked_requests", &self.blocked_requests)?;
        s.serialize_field("blocked_rate", &self.blocked_rate())?;
        s.serialize_field("elapsed_ms", &self.elapsed().as_millis())?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_tracking() {
        let mut stats = ConcurrencyStats::default();

        stats.record_acquire();
        stats.record_acquire();
        assert!(stats.record_release());
        stats.record_acquire();

        assert_eq!(stats.current_requests, 2);
        assert_eq!(stats.peak_requests, 2);
        assert_eq!(stats.total_requests, 3);
    }

    #[test]
    fn test_release_without_acquire_is_rejected() {
        let mut stats = ConcurrencyStats::default();
        assert!(!stats.record_release());
        assert_eq!(stats.current_requests, 0);
    }

    #[test]
    fn test_reset_keeps_in_flight() {
        let mut stats = ConcurrencyStats::default();
        stats.record_acquire();
        stats.record_acquire();
        stats.record_blocked();
        assert!(stats.record_release());

        stats.reset();
        assert_eq!(stats.current_requests, 1);
        assert_eq!(stats.peak_requests, 1);
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.blocked_requests, 0);
    }

    #[test]
    fn test_summary_formatting() {
        let mut stats = ConcurrencyStats::default();
        stats.record_acquire();
        stats.record_acquire();
        stats.record_blocked();

        let summary = stats.summary();
        assert!(summary.contains("2 requests"));
        assert!(summary.contains("peak 2"));
        assert!(summary.contains("50% blocked"));
    }

    #[test]
    fn test_stats_serialization() {
        let mut stats = ConcurrencyStats::default();
        stats.record_acquire();

        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["current_requests"], 1);
        assert_eq!(json["total_requests"], 1);
        assert_eq!(json["blocked_requests"], 0);
    }
}
