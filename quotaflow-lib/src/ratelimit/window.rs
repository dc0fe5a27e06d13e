use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// One admitted call as seen by a [`Window`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Entry {
    pub(crate) at: Instant,
    pub(crate) cost: u64,
}

/// A sliding time window over admitted calls.
///
/// Entries are kept in admission order, so the front is always the oldest
/// entry and the first to expire. The running sum is kept next to the entries
/// so that budget checks do not walk the whole window.
#[derive(Debug, Clone)]
pub(crate) struct Window {
    entries: VecDeque<Entry>,
    length: Duration,
    budget: u64,
    total: u64,
}

impl Window {
    /// Create a new window spanning `length` that admits at most `budget`
    pub(crate) const fn new(length: Duration, budget: u64) -> Self {
        Self {
            entries: VecDeque::new(),
            length,
            budget,
            total: 0,
        }
    }

    /// Remove every entry that is at least `length` old at `now`
    pub(crate) fn prune(&mut self, now: Instant) {
        while let Some(entry) = self.entries.front() {
            if now.saturating_duration_since(entry.at) < self.length {
                break;
            }
            self.total -= entry.cost;
            self.entries.pop_front();
        }
    }

    /// Whether another call of `cost` fits into the budget.
    ///
    /// An empty window always has headroom, even for a single call that is
    /// larger than the whole budget.
    pub(crate) fn has_headroom(&self, cost: u64) -> bool {
        self.entries.is_empty() || self.total.saturating_add(cost) <= self.budget
    }

    /// Record an admitted call
    pub(crate) fn push(&mut self, at: Instant, cost: u64) {
        self.total += cost;
        self.entries.push_back(Entry { at, cost });
    }

    /// Time from `now` until the oldest entry leaves the window
    pub(crate) fn until_oldest_expires(&self, now: Instant) -> Option<Duration> {
        self.entries
            .front()
            .map(|oldest| (oldest.at + self.length).saturating_duration_since(now))
    }

    /// Estimated time until one entry's worth of capacity is freed.
    ///
    /// The time until the oldest entry expires is spread over every entry
    /// that currently competes for the window.
    pub(crate) fn per_entry_wait(&self, now: Instant) -> Option<Duration> {
        let until_oldest = self.until_oldest_expires(now)?;
        #[allow(clippy::cast_possible_truncation)]
        let contenders = self.entries.len().max(1) as u32;
        Some(until_oldest / contenders)
    }

    /// Summed cost of all entries currently in the window
    pub(crate) const fn total(&self) -> u64 {
        self.total
    }

    /// Number of entries currently in the window
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the window is empty
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_window_prunes_expired_entries() {
        let start = Instant::now();
        let mut window = Window::new(MINUTE, 10);

        window.push(start, 3);
        window.push(start + Duration::from_secs(30), 4);
        assert_eq!(window.total(), 7);

        window.prune(start + Duration::from_secs(59));
        assert_eq!(window.len(), 2);

        // Exactly one window length later the first entry is gone
        window.prune(start + MINUTE);
        assert_eq!(window.len(), 1);
        assert_eq!(window.total(), 4);

        window.prune(start + Duration::from_secs(90));
        assert!(window.is_empty());
        assert_eq!(window.total(), 0);
    }

    #[test]
    fn test_window_headroom() {
        let now = Instant::now();
        let mut window = Window::new(MINUTE, 10);

        assert!(window.has_headroom(10));
        window.push(now, 6);
        assert!(window.has_headroom(4));
        assert!(!window.has_headroom(5));
    }

    #[test]
    fn test_oversized_call_fits_empty_window() {
        let now = Instant::now();
        let mut window = Window::new(MINUTE, 10);

        assert!(window.has_headroom(1_000));
        window.push(now, 1_000);
        assert!(!window.has_headroom(1));
    }

    #[test]
    fn test_per_entry_wait() {
        let start = Instant::now();
        let mut window = Window::new(MINUTE, 4);
        for _ in 0..4 {
            window.push(start, 1);
        }

        assert_eq!(window.until_oldest_expires(start), Some(MINUTE));
        assert_eq!(window.per_entry_wait(start), Some(Duration::from_secs(15)));
        assert_eq!(
            window.until_oldest_expires(start + Duration::from_secs(70)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_empty_window_has_no_wait() {
        let window = Window::new(MINUTE, 4);
        assert_eq!(window.per_entry_wait(Instant::now()), None);
    }
}
