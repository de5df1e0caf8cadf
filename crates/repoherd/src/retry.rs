//! Escalating retry tiers.
//!
//! Tier 1 lives inside the executor (immediate retries within one attempt
//! boundary). This module implements the two wider tiers as a single sweep
//! routine parameterized by tier, rather than separate copies: the group
//! tier resubmits a group's still-failed tasks after its batch finishes, and
//! the global tier resubmits everything still failed after all groups ran.

use std::sync::Arc;

use crate::executor::SyncExecutor;
use crate::progress::{emit, ProgressCallback, SyncProgress};
use crate::shutdown::Shutdown;
use crate::stats::StatsCollector;
use crate::types::{RepoTask, RetryTier, SyncOutcome};

/// Batch outcomes split by what the next tier can do with them.
#[derive(Debug, Default)]
pub struct Partition {
    /// Outcomes that completed (cloned, updated or skipped), kept whole so
    /// the caller can still tell clones apart from skips.
    pub succeeded: Vec<SyncOutcome>,
    /// Failed tasks a wider tier may still recover.
    pub retryable: Vec<RepoTask>,
    /// Failed tasks no tier will retry: structural conflicts, cancellations.
    pub terminal: Vec<RepoTask>,
}

impl Partition {
    pub fn from_outcomes(outcomes: Vec<SyncOutcome>) -> Self {
        let mut split = Self::default();
        for outcome in outcomes {
            if outcome.is_success() {
                split.succeeded.push(outcome);
            } else if outcome.retryable {
                split.retryable.push(outcome.task);
            } else {
                split.terminal.push(outcome.task);
            }
        }
        split
    }
}

/// Resubmit failed tasks once at the given tier.
///
/// The stats collector treats any success here as a recovery, superseding
/// the provisional failed record exactly once.
#[allow(clippy::too_many_arguments)]
pub async fn retry_sweep(
    tier: RetryTier,
    tasks: Vec<RepoTask>,
    executor: Arc<dyn SyncExecutor>,
    parallelism: usize,
    connections: usize,
    stats: &StatsCollector,
    on_progress: Option<&ProgressCallback>,
    shutdown: Arc<Shutdown>,
) -> Partition {
    if tasks.is_empty() {
        return Partition::default();
    }

    emit(
        on_progress,
        SyncProgress::RetrySweep {
            tier,
            count: tasks.len(),
        },
    );
    tracing::info!(%tier, count = tasks.len(), "resubmitting failed tasks");

    let outcomes = crate::scheduler::run_batch(
        executor,
        tasks,
        parallelism,
        connections,
        tier,
        stats,
        on_progress,
        shutdown,
    )
    .await;

    Partition::from_outcomes(outcomes)
}
