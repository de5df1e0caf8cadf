//! Progress events streamed to the front-end while a run executes.
//!
//! Runs can take very long for many or large repositories, so completion must
//! be observable incrementally. The engine emits one event per noteworthy
//! step through an optional callback; the CLI renders them either as progress
//! bars or as structured log lines.

use std::path::PathBuf;

use crate::types::{OutcomeKind, RetryTier};

/// Callback invoked for every progress event. Events arrive from genuinely
/// concurrent workers, so implementations must be thread safe.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit an event if a callback is installed.
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(callback) = on_progress {
        callback(event);
    }
}

/// Progress events emitted during a sync run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// Issuing the bulk remote listing.
    BuildingIndex { owner: String },

    /// Remote index populated.
    IndexReady { total: usize },

    /// A group's members were classified.
    GroupPlanned {
        group: String,
        to_clone: usize,
        present: usize,
        conflicting: usize,
        missing: usize,
    },

    /// Requested parallelism exceeded the hard clamp and was reduced.
    ParallelismClamped { requested: usize, max: usize },

    /// A batch of tasks was handed to the scheduler.
    BatchStarted {
        tier: RetryTier,
        count: usize,
        parallelism: usize,
    },

    /// One task completed (in nondeterministic completion order).
    TaskFinished {
        full_name: String,
        tier: RetryTier,
        kind: OutcomeKind,
        error: Option<String>,
        duration_ms: u64,
    },

    /// A previously failed task succeeded in a wider retry tier.
    TaskRecovered { full_name: String, tier: RetryTier },

    /// A retry tier is resubmitting failed tasks.
    RetrySweep { tier: RetryTier, count: usize },

    /// Post-clone integrity checks started.
    CheckingRepos { count: usize },

    /// An integrity check passed.
    CheckPassed { full_name: String },

    /// An integrity check failed; the repository is counted failed.
    CheckFailed { full_name: String, error: String },

    /// Scanning group folders for local repositories to reconcile.
    Reconciling { folders: usize },

    /// A local repository confirmed absent remotely was deleted.
    OrphanDeleted { path: PathBuf },

    /// A reconciliation candidate was kept.
    OrphanRetained { path: PathBuf, reason: RetainReason },

    /// The failed-task artifact was written.
    ArtifactWritten { path: PathBuf, count: usize },
}

/// Why a reconciliation candidate was not deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetainReason {
    /// The remote account still contains the repository; it is merely outside
    /// the requested group selection this run.
    StillRemote,
    /// The existence re-check itself failed. Never fail destructive.
    CheckFailed,
    /// The remote confirmed the repository gone but removing the local
    /// directory failed.
    DeleteFailed,
}
