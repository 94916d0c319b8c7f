//! Runtime statistics for the monitor.

/// Poll and persistence counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStats {
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub polls_started: u64,
    pub polls_succeeded: u64,
    pub polls_failed: u64,
    pub polls_cancelled: u64,
    pub saves: u64,
    pub save_failures: u64,
}

impl PollStats {
    /// Polls started but not yet finished, failed or cancelled.
    pub fn polls_outstanding(&self) -> u64 {
        self.polls_started
            .saturating_sub(self.polls_succeeded + self.polls_failed + self.polls_cancelled)
    }
}
