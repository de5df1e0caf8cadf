//! Fast-forward update flow for repositories that already exist locally.
//!
//! The clone flow leaves present repositories alone; this flow brings them up
//! to date with `git pull --ff-only`. Pull failures are far more varied than
//! clone failures (dirty worktrees, diverged branches, deleted remote refs),
//! so stderr is classified into a reason the summary can aggregate instead of
//! echoing raw git output per repository.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::{CatalogError, GroupCatalog};
use crate::executor::{ExecResult, SyncExecutor};
use crate::git::{self, GitError};
use crate::probe::{self, LocalRepoState};
use crate::progress::ProgressCallback;
use crate::scheduler;
use crate::shutdown::Shutdown;
use crate::stats::StatsCollector;
use crate::types::{CloneMode, RepoTask, RetryTier, SyncOutcome};

/// Why a pull failed, classified from git's stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullFailureReason {
    /// The destination is not a git repository (or lost its remote).
    NotARepository,
    /// The tracked remote ref no longer exists.
    RemoteRefMissing,
    /// Uncommitted local changes block the update.
    LocalChanges,
    /// Local and remote histories share no common ancestor.
    UnrelatedHistories,
    /// The local branch has diverged; a fast-forward is impossible.
    NotFastForward,
    /// Transfer-level network fault.
    Network,
    /// Credential or permission fault.
    Auth,
    Unknown,
}

impl PullFailureReason {
    /// Classify git's stderr. Checks the most specific patterns first; git
    /// wording varies between versions so matching is substring based.
    pub fn classify(stderr: &str) -> Self {
        let text = stderr.to_lowercase();
        if text.contains("not a git repository") {
            Self::NotARepository
        } else if text.contains("couldn't find remote ref") || text.contains("no such ref") {
            Self::RemoteRefMissing
        } else if text.contains("would be overwritten")
            || text.contains("your local changes")
            || text.contains("unstaged changes")
        {
            Self::LocalChanges
        } else if text.contains("unrelated histories") {
            Self::UnrelatedHistories
        } else if text.contains("not possible to fast-forward") || text.contains("diverg") {
            Self::NotFastForward
        } else if text.contains("could not resolve host")
            || text.contains("connection timed out")
            || text.contains("early eof")
            || text.contains("unable to access")
        {
            Self::Network
        } else if text.contains("authentication failed")
            || text.contains("permission denied")
            || text.contains("could not read username")
        {
            Self::Auth
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for PullFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotARepository => "not a git repository",
            Self::RemoteRefMissing => "remote ref missing",
            Self::LocalChanges => "local changes in the way",
            Self::UnrelatedHistories => "unrelated histories",
            Self::NotFastForward => "not fast-forward",
            Self::Network => "network fault",
            Self::Auth => "authentication fault",
            Self::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

/// Updates existing repositories with the system git binary.
pub struct PullExecutor {
    shutdown: Arc<Shutdown>,
}

impl PullExecutor {
    pub fn new(shutdown: Arc<Shutdown>) -> Self {
        Self { shutdown }
    }
}

#[async_trait]
impl SyncExecutor for PullExecutor {
    async fn execute(&self, task: &RepoTask, _connections: usize) -> Result<ExecResult, GitError> {
        match probe::probe(&task.dest) {
            // Absent repositories belong to the clone flow.
            LocalRepoState::Absent => return Ok(ExecResult::Skipped),
            LocalRepoState::ConflictingDirectory => {
                return Err(GitError::ConflictingDestination(task.dest.clone()));
            }
            LocalRepoState::ValidRepository => {}
        }

        match git::pull_repo(&task.dest, &self.shutdown).await {
            Ok(()) => Ok(ExecResult::Updated),
            Err(GitError::Command {
                operation,
                target,
                stderr,
            }) => {
                let reason = PullFailureReason::classify(&stderr);
                Err(GitError::Command {
                    operation,
                    target,
                    stderr: format!("{reason}: {stderr}"),
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// Tasks for every member of the selected groups that exists locally as a
/// valid repository. Absent and conflicting destinations are left out.
pub fn plan_pull(
    catalog: &GroupCatalog,
    groups: &[String],
    root: &Path,
) -> Result<Vec<RepoTask>, CatalogError> {
    let mut tasks = Vec::new();
    for group in catalog.select(groups)? {
        let folder = group.folder(root);
        for (seq, member) in group.members.iter().enumerate() {
            let dest = folder.join(member);
            if probe::probe(&dest) != LocalRepoState::ValidRepository {
                continue;
            }
            tasks.push(RepoTask {
                full_name: format!("{}/{}", catalog.owner, member),
                short_name: member.clone(),
                dest,
                group: group.name.clone(),
                seq,
                mode: CloneMode::Full,
            });
        }
    }
    Ok(tasks)
}

/// Update every present repository of the selected groups under bounded
/// concurrency. Pull failures are terminal; there are no wider retry tiers
/// because the classified reasons are almost never transient.
#[allow(clippy::too_many_arguments)]
pub async fn run_pull(
    executor: Arc<dyn SyncExecutor>,
    catalog: &GroupCatalog,
    groups: &[String],
    root: &Path,
    parallelism: usize,
    stats: &StatsCollector,
    on_progress: Option<&ProgressCallback>,
    shutdown: Arc<Shutdown>,
) -> Result<Vec<SyncOutcome>, CatalogError> {
    let tasks = plan_pull(catalog, groups, root)?;
    Ok(scheduler::run_batch(
        executor,
        tasks,
        parallelism,
        1,
        RetryTier::Initial,
        stats,
        on_progress,
        shutdown,
    )
    .await)
}
