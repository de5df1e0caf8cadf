//! Run statistics aggregation.
//!
//! All counter mutation funnels through [`StatsCollector`]'s synchronized
//! methods regardless of which concurrent worker reports the outcome; workers
//! never touch the counters directly.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::{OutcomeKind, RetryTier, SyncOutcome};

/// Aggregate counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStatistics {
    pub cloned: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Destinations occupied by a non-repository directory.
    pub conflicting: usize,
    /// Members with no resolvable remote identity.
    pub missing: usize,
    /// Tasks currently in failed state (provisional until all tiers ran).
    pub failed: usize,
    /// Failed tasks recovered by a wider retry tier.
    pub recovered: usize,
    /// Local repositories deleted by reconciliation.
    pub deleted: usize,
    /// Repositories above the huge-size threshold (still cloned shallow).
    pub huge: usize,
}

impl RunStatistics {
    /// Total number of terminal, non-failed task outcomes.
    pub fn succeeded(&self) -> usize {
        self.cloned + self.updated + self.skipped
    }
}

/// Owns the mutable [`RunStatistics`]; the single aggregation point shared by
/// the scheduler, the retry tiers and the reconciler.
#[derive(Debug)]
pub struct StatsCollector {
    inner: Mutex<RunStatistics>,
    started: Instant,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RunStatistics::default()),
            started: Instant::now(),
        }
    }

    /// Record one completed attempt.
    ///
    /// Initial-tier outcomes count directly. A success at a wider tier
    /// supersedes the provisional failed record: the failure counter is
    /// decremented and the success counter incremented exactly once. A
    /// failure at a wider tier changes nothing; the task is already counted.
    pub fn record(&self, outcome: &SyncOutcome) {
        let mut stats = self.lock();
        match outcome.tier {
            RetryTier::Initial => match outcome.kind {
                OutcomeKind::Cloned => stats.cloned += 1,
                OutcomeKind::Updated => stats.updated += 1,
                OutcomeKind::Skipped => stats.skipped += 1,
                OutcomeKind::Failed => stats.failed += 1,
            },
            RetryTier::Group | RetryTier::Global => match outcome.kind {
                OutcomeKind::Failed => {}
                kind => {
                    stats.failed = stats.failed.saturating_sub(1);
                    stats.recovered += 1;
                    match kind {
                        OutcomeKind::Cloned => stats.cloned += 1,
                        OutcomeKind::Updated => stats.updated += 1,
                        OutcomeKind::Skipped => stats.skipped += 1,
                        OutcomeKind::Failed => unreachable!(),
                    }
                }
            },
        }
    }

    /// Record members classified `AlreadyPresent` (skipped by the baseline
    /// engine; updating is the pull flow's concern).
    pub fn record_present(&self, count: usize) {
        self.lock().skipped += count;
    }

    /// Record members whose remote identity could not be resolved. These are
    /// immediate failures and are never retried.
    pub fn record_missing(&self, count: usize) {
        let mut stats = self.lock();
        stats.missing += count;
        stats.failed += count;
    }

    /// Record destinations occupied by a non-repository directory,
    /// skipped-with-warning and never auto-deleted.
    pub fn record_conflicting(&self, count: usize) {
        let mut stats = self.lock();
        stats.conflicting += count;
        stats.skipped += count;
    }

    pub fn record_huge(&self, count: usize) {
        self.lock().huge += count;
    }

    pub fn record_deleted(&self) {
        self.lock().deleted += 1;
    }

    /// A clone that later failed its integrity check is reclassified failed.
    pub fn record_check_failure(&self) {
        let mut stats = self.lock();
        stats.cloned = stats.cloned.saturating_sub(1);
        stats.failed += 1;
    }

    pub fn snapshot(&self) -> RunStatistics {
        self.lock().clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunStatistics> {
        // A poisoned lock means a worker panicked mid-update; the counters
        // are still the best summary available.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}
