//! Post-clone integrity verification.
//!
//! Optionally runs `git fsck --strict` over every repository cloned this run,
//! under the same bounded concurrency as the scheduler. A repository that
//! fails its check is reclassified from cloned to failed and lands in the
//! failed-task artifact like any other terminal failure.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};

use crate::git::{self, GitError};
use crate::progress::{emit, ProgressCallback, SyncProgress};
use crate::shutdown::Shutdown;
use crate::stats::StatsCollector;
use crate::types::{RepoTask, CHECK_TIMEOUT};

/// One repository that failed verification.
#[derive(Debug)]
pub struct CheckFailure {
    pub task: RepoTask,
    pub error: String,
}

/// Verify the given just-cloned repositories, recording each failure into
/// `stats`. Returns the failures so the engine can fold them into the
/// artifact.
pub async fn check_repos(
    tasks: Vec<RepoTask>,
    parallelism: usize,
    stats: &StatsCollector,
    on_progress: Option<&ProgressCallback>,
    shutdown: Arc<Shutdown>,
) -> Vec<CheckFailure> {
    if tasks.is_empty() {
        return Vec::new();
    }

    emit(on_progress, SyncProgress::CheckingRepos { count: tasks.len() });

    let parallelism = parallelism.clamp(1, tasks.len());
    let semaphore = Arc::new(Semaphore::new(parallelism));
    let (tx, mut rx) = mpsc::channel::<(RepoTask, Result<(), GitError>)>(tasks.len());

    for task in tasks {
        if shutdown.is_requested() {
            break;
        }
        let semaphore = Arc::clone(&semaphore);
        let shutdown = Arc::clone(&shutdown);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };
            let result = git::fsck_repo(&task.dest, CHECK_TIMEOUT, &shutdown).await;
            let _ = tx.send((task, result)).await;
        });
    }
    drop(tx);

    let mut failures = Vec::new();
    while let Some((task, result)) = rx.recv().await {
        match result {
            Ok(()) => {
                tracing::debug!(repo = %task.full_name, "integrity check passed");
                emit(
                    on_progress,
                    SyncProgress::CheckPassed {
                        full_name: task.full_name,
                    },
                );
            }
            Err(GitError::Canceled) => {}
            Err(error) => {
                let error = error.to_string();
                tracing::warn!(repo = %task.full_name, %error, "integrity check failed");
                stats.record_check_failure();
                emit(
                    on_progress,
                    SyncProgress::CheckFailed {
                        full_name: task.full_name.clone(),
                        error: error.clone(),
                    },
                );
                failures.push(CheckFailure { task, error });
            }
        }
    }
    failures
}
