//! Shared task and outcome types plus engine-wide constants.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Hard upper clamp on simultaneous clone/update workers. Values above this
/// are reduced silently (with a warning event) to bound external-process and
/// network load.
pub const MAX_TASK_PARALLELISM: usize = 64;

/// Default number of repositories synced at once.
pub const DEFAULT_TASK_PARALLELISM: usize = 5;

/// Default `git clone --jobs` transfer parallelism per repository.
pub const DEFAULT_TRANSFER_PARALLELISM: usize = 8;

/// Attempts per task inside the executor, including the first one. Transient
/// network faults are common and cheap to retry immediately.
pub const CLONE_ATTEMPTS: u32 = 3;

/// Fixed delay between immediate clone attempts.
pub const CLONE_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Timeout for the post-clone `git fsck` integrity check.
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Repositories at or above this size are cloned shallow.
pub const DEFAULT_SHALLOW_THRESHOLD: u64 = 256 * 1024 * 1024;

/// Repositories at or above this size are additionally reported in the run
/// summary. They are still cloned shallow, nothing changes beyond reporting.
pub const DEFAULT_HUGE_THRESHOLD: u64 = 1024 * 1024 * 1024;

/// How a repository is transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneMode {
    /// Full history.
    Full,
    /// `--depth 1`, chosen for repositories above the size threshold.
    Shallow,
}

/// Size thresholds governing the clone strategy.
#[derive(Debug, Clone, Copy)]
pub struct SizePolicy {
    /// At or above this many bytes, clone shallow.
    pub shallow_bytes: u64,
    /// At or above this many bytes, also count the repository as huge.
    pub huge_bytes: u64,
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self {
            shallow_bytes: DEFAULT_SHALLOW_THRESHOLD,
            huge_bytes: DEFAULT_HUGE_THRESHOLD,
        }
    }
}

impl SizePolicy {
    /// Decide the clone mode for a repository of the given size.
    ///
    /// Missing size data never blocks a clone; it just means a full clone.
    pub fn decide(&self, size_bytes: Option<u64>) -> (CloneMode, bool) {
        match size_bytes {
            Some(size) if size >= self.huge_bytes => (CloneMode::Shallow, true),
            Some(size) if size >= self.shallow_bytes => (CloneMode::Shallow, false),
            _ => (CloneMode::Full, false),
        }
    }
}

/// One unit of work: clone (or update) a single repository into its group
/// folder. Immutable once produced by the diff analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTask {
    /// Fully-qualified remote identifier, `owner/name`.
    pub full_name: String,
    /// Repository short name.
    pub short_name: String,
    /// Destination path, always `<group folder>/<short_name>`.
    pub dest: PathBuf,
    /// Name of the owning group.
    pub group: String,
    /// Position of the member within its group, for stable reporting.
    pub seq: usize,
    /// Transfer strategy chosen by the size policy.
    pub mode: CloneMode,
}

/// Which retry pass produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RetryTier {
    /// First dispatch of the group's batch.
    Initial,
    /// Resubmission after the group's batch finished.
    Group,
    /// Final resubmission after all groups were processed.
    Global,
}

impl fmt::Display for RetryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryTier::Initial => write!(f, "initial"),
            RetryTier::Group => write!(f, "group"),
            RetryTier::Global => write!(f, "global"),
        }
    }
}

/// Terminal classification of one completed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Cloned,
    Updated,
    Skipped,
    Failed,
}

/// Produced exactly once per completed scheduler attempt. A later retry tier
/// produces a superseding outcome for the same task; the stats collector is
/// responsible for replacing, not duplicating, the earlier failed record.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub task: RepoTask,
    pub kind: OutcomeKind,
    /// Error message for failed outcomes.
    pub error: Option<String>,
    /// Whether a wider retry tier may still recover this failure. Structural
    /// failures (conflicting destination) and cancellations are not retried.
    pub retryable: bool,
    pub duration_ms: u64,
    pub tier: RetryTier,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        self.kind != OutcomeKind::Failed
    }
}
