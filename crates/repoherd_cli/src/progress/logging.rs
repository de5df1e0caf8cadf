//! Logging reporter using tracing for structured output.

use repoherd::progress::RetainReason;
use repoherd::types::OutcomeKind;
use repoherd::SyncProgress;

pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    /// Handle a progress event.
    pub fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::BuildingIndex { owner } => {
                tracing::info!(owner = %owner, "fetching account listing");
            }

            SyncProgress::IndexReady { total } => {
                tracing::info!(total, "remote index ready");
            }

            SyncProgress::GroupPlanned {
                group,
                to_clone,
                present,
                conflicting,
                missing,
            } => {
                tracing::info!(group = %group, to_clone, present, conflicting, missing, "group planned");
            }

            SyncProgress::ParallelismClamped { requested, max } => {
                tracing::warn!(requested, max, "parallelism clamped");
            }

            SyncProgress::BatchStarted {
                tier,
                count,
                parallelism,
            } => {
                tracing::info!(%tier, count, parallelism, "batch started");
            }

            SyncProgress::TaskFinished {
                full_name,
                tier,
                kind,
                error,
                duration_ms,
            } => match kind {
                OutcomeKind::Failed => {
                    tracing::warn!(repo = %full_name, %tier, error = ?error, duration_ms, "task failed");
                }
                OutcomeKind::Skipped => {
                    tracing::debug!(repo = %full_name, "already present");
                }
                _ => {
                    tracing::info!(repo = %full_name, ?kind, duration_ms, "task finished");
                }
            },

            SyncProgress::TaskRecovered { full_name, tier } => {
                tracing::info!(repo = %full_name, %tier, "recovered");
            }

            SyncProgress::RetrySweep { tier, count } => {
                tracing::info!(%tier, count, "retry sweep");
            }

            SyncProgress::CheckingRepos { count } => {
                tracing::info!(count, "checking repository integrity");
            }

            SyncProgress::CheckFailed { full_name, error } => {
                tracing::warn!(repo = %full_name, error = %error, "integrity check failed");
            }

            SyncProgress::Reconciling { folders } => {
                tracing::info!(folders, "reconciling group folders");
            }

            SyncProgress::OrphanDeleted { path } => {
                tracing::info!(path = %path.display(), "deleted local clone; remote gone");
            }

            SyncProgress::OrphanRetained { path, reason } => match reason {
                RetainReason::CheckFailed => {
                    tracing::warn!(path = %path.display(), "existence re-check failed; retained");
                }
                RetainReason::DeleteFailed => {
                    tracing::warn!(path = %path.display(), "removal failed; retained");
                }
                _ => {
                    tracing::debug!(path = %path.display(), "still exists remotely; retained");
                }
            },

            SyncProgress::ArtifactWritten { path, count } => {
                tracing::info!(path = %path.display(), count, "failed-task artifact written");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
