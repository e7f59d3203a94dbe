//! Reconnection backoff policy

use std::time::Duration;

/// Maps a reconnection attempt count to the delay before that attempt.
///
/// Attempt `n` waits `delays[n]`; once the list is exhausted the policy
/// answers `None` and the connection stays closed until reconnected manually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delays: Vec<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(vec![
            Duration::ZERO,
            Duration::from_millis(5_000),
            Duration::from_millis(10_000),
            Duration::from_millis(15_000),
        ])
    }
}

impl ReconnectPolicy {
    /// Policy with an explicit delay schedule
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Policy that never reconnects automatically
    pub fn never() -> Self {
        Self { delays: Vec::new() }
    }

    /// Delay before attempt `attempt`, or `None` to stop retrying
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        self.delays.get(attempt as usize).copied()
    }

    /// Number of automatic attempts before giving up
    pub fn max_attempts(&self) -> usize {
        self.delays.len()
    }
}
