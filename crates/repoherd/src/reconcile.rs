//! Reconciliation: delete local clones whose remote repository is gone.
//!
//! Deletion is the one destructive operation in the engine, so it never
//! trusts the bulk listing alone. Every candidate gets its own targeted
//! existence re-check against the remote before anything is removed; an
//! inconclusive check always retains the directory. The scan covers every
//! group folder the catalog defines, not just the groups requested this run,
//! so a repository moved between groups is not mistaken for an orphan.
//!
//! Reconciliation never aborts the run. An unreadable folder is skipped with
//! a warning and a failed removal retains the candidate; the engine still
//! writes the artifact and summary either way.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::github::RemoteHost;
use crate::probe::{self, LocalRepoState};
use crate::progress::{emit, ProgressCallback, RetainReason, SyncProgress};
use crate::shutdown::Shutdown;
use crate::stats::StatsCollector;

/// What the reconciler did, path by path.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub deleted: Vec<PathBuf>,
    pub retained: Vec<(PathBuf, RetainReason)>,
}

/// Scan `folders` for valid local repositories outside the synced set and
/// delete the ones the remote confirms are gone.
///
/// `synced` holds the destination paths of every member of every requested
/// group, whether or not the member needed work this run; anything in it is
/// never a candidate. Non-repository directories are never touched either.
#[allow(clippy::too_many_arguments)]
pub async fn reconcile(
    host: &dyn RemoteHost,
    owner: &str,
    folders: &[PathBuf],
    synced: &HashSet<PathBuf>,
    stats: &StatsCollector,
    on_progress: Option<&ProgressCallback>,
    shutdown: &Shutdown,
) -> ReconcileReport {
    emit(
        on_progress,
        SyncProgress::Reconciling {
            folders: folders.len(),
        },
    );

    let mut report = ReconcileReport::default();
    for folder in folders {
        if shutdown.is_requested() {
            break;
        }
        let candidates = match candidates_in(folder, synced) {
            Ok(candidates) => candidates,
            Err(error) => {
                tracing::warn!(
                    folder = %folder.display(),
                    %error,
                    "failed to scan group folder; skipping"
                );
                continue;
            }
        };
        for candidate in candidates {
            if shutdown.is_requested() {
                break;
            }
            let name = match candidate.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            match host.repo_exists(owner, &name).await {
                Ok(true) => {
                    tracing::debug!(path = %candidate.display(), "still exists remotely; retained");
                    emit(
                        on_progress,
                        SyncProgress::OrphanRetained {
                            path: candidate.clone(),
                            reason: RetainReason::StillRemote,
                        },
                    );
                    report.retained.push((candidate, RetainReason::StillRemote));
                }
                Ok(false) => {
                    tracing::info!(path = %candidate.display(), "remote repository gone; deleting local clone");
                    match tokio::fs::remove_dir_all(&candidate).await {
                        Ok(()) => {
                            stats.record_deleted();
                            emit(
                                on_progress,
                                SyncProgress::OrphanDeleted {
                                    path: candidate.clone(),
                                },
                            );
                            report.deleted.push(candidate);
                        }
                        Err(error) => {
                            tracing::warn!(
                                path = %candidate.display(),
                                %error,
                                "failed to delete orphan; retaining local clone"
                            );
                            emit(
                                on_progress,
                                SyncProgress::OrphanRetained {
                                    path: candidate.clone(),
                                    reason: RetainReason::DeleteFailed,
                                },
                            );
                            report.retained.push((candidate, RetainReason::DeleteFailed));
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        path = %candidate.display(),
                        %error,
                        "existence re-check failed; retaining local clone"
                    );
                    emit(
                        on_progress,
                        SyncProgress::OrphanRetained {
                            path: candidate.clone(),
                            reason: RetainReason::CheckFailed,
                        },
                    );
                    report.retained.push((candidate, RetainReason::CheckFailed));
                }
            }
        }
    }
    report
}

/// Valid repositories directly under `folder` that are not in the synced set.
fn candidates_in(folder: &Path, synced: &HashSet<PathBuf>) -> std::io::Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        if synced.contains(&path) {
            continue;
        }
        if probe::probe(&path) == LocalRepoState::ValidRepository {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::github::{HostError, RemoteRepo};

    struct CheckingHost {
        existing: Vec<String>,
        erroring: Vec<String>,
        checks: AtomicUsize,
    }

    impl CheckingHost {
        fn new(existing: &[&str], erroring: &[&str]) -> Self {
            Self {
                existing: existing.iter().map(|s| s.to_string()).collect(),
                erroring: erroring.iter().map(|s| s.to_string()).collect(),
                checks: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteHost for CheckingHost {
        async fn list_repos(&self, _owner: &str) -> Result<Vec<RemoteRepo>, HostError> {
            Ok(Vec::new())
        }

        async fn repo_exists(&self, _owner: &str, name: &str) -> Result<bool, HostError> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            if self.erroring.iter().any(|e| e == name) {
                return Err(HostError::RateLimited);
            }
            Ok(self.existing.iter().any(|e| e == name))
        }

        async fn repo_size(&self, _owner: &str, _name: &str) -> Result<Option<u64>, HostError> {
            Ok(None)
        }
    }

    fn make_repo(folder: &Path, name: &str) -> PathBuf {
        let path = folder.join(name);
        std::fs::create_dir_all(path.join(".git")).unwrap();
        path
    }

    #[tokio::test]
    async fn confirmed_orphans_are_deleted_and_counted() {
        let root = tempfile::tempdir().unwrap();
        let folder = root.path().join("Backend (hl-7)");
        let orphan = make_repo(&folder, "retired");
        let stats = StatsCollector::new();

        let host = CheckingHost::new(&[], &[]);
        let report = reconcile(
            &host,
            "acme",
            &[folder],
            &HashSet::new(),
            &stats,
            None,
            &Shutdown::new(),
        )
        .await;

        assert_eq!(report.deleted, vec![orphan.clone()]);
        assert!(!orphan.exists());
        assert_eq!(stats.snapshot().deleted, 1);
    }

    #[tokio::test]
    async fn still_remote_repositories_are_retained() {
        // `side` exists remotely but is outside the requested selection; it
        // must survive reconciliation.
        let root = tempfile::tempdir().unwrap();
        let folder = root.path().join("Tools");
        let side = make_repo(&folder, "side");
        let stats = StatsCollector::new();

        let host = CheckingHost::new(&["side"], &[]);
        let report = reconcile(
            &host,
            "acme",
            &[folder],
            &HashSet::new(),
            &stats,
            None,
            &Shutdown::new(),
        )
        .await;

        assert!(side.exists());
        assert_eq!(report.retained, vec![(side, RetainReason::StillRemote)]);
        assert_eq!(stats.snapshot().deleted, 0);
    }

    #[tokio::test]
    async fn failed_recheck_never_deletes() {
        let root = tempfile::tempdir().unwrap();
        let folder = root.path().join("Tools");
        let flaky = make_repo(&folder, "flaky");
        let stats = StatsCollector::new();

        let host = CheckingHost::new(&[], &["flaky"]);
        let report = reconcile(
            &host,
            "acme",
            &[folder],
            &HashSet::new(),
            &stats,
            None,
            &Shutdown::new(),
        )
        .await;

        assert!(flaky.exists());
        assert_eq!(report.retained, vec![(flaky, RetainReason::CheckFailed)]);
        assert_eq!(stats.snapshot().deleted, 0);
    }

    #[tokio::test]
    async fn synced_paths_and_plain_directories_are_never_candidates() {
        let root = tempfile::tempdir().unwrap();
        let folder = root.path().join("Backend (hl-7)");
        let kept = make_repo(&folder, "svcA");
        // Not a repository: never touched, never checked.
        std::fs::create_dir_all(folder.join("scratch")).unwrap();

        let synced: HashSet<PathBuf> = [kept.clone()].into();
        let host = CheckingHost::new(&[], &[]);
        let stats = StatsCollector::new();
        let report = reconcile(
            &host,
            "acme",
            &[folder.clone()],
            &synced,
            &stats,
            None,
            &Shutdown::new(),
        )
        .await;

        assert!(report.deleted.is_empty() && report.retained.is_empty());
        assert_eq!(host.checks.load(Ordering::SeqCst), 0, "no re-checks issued");
        assert!(kept.exists());
        assert!(folder.join("scratch").exists());
    }

    /// A candidate whose removal fails must be retained, and the sweep must
    /// carry on with the remaining candidates.
    #[cfg(unix)]
    #[tokio::test]
    async fn failed_deletion_retains_and_continues() {
        let root = tempfile::tempdir().unwrap();
        let folder = root.path().join("Tools");
        std::fs::create_dir_all(&folder).unwrap();

        // Symlinked clone: remove_dir_all refuses to follow the link, so the
        // removal reliably errors without touching the target.
        let target = root.path().join("elsewhere");
        std::fs::create_dir_all(target.join(".git")).unwrap();
        let linked = folder.join("linked");
        std::os::unix::fs::symlink(&target, &linked).unwrap();
        let retired = make_repo(&folder, "retired");

        let host = CheckingHost::new(&[], &[]);
        let stats = StatsCollector::new();
        let report = reconcile(
            &host,
            "acme",
            &[folder],
            &HashSet::new(),
            &stats,
            None,
            &Shutdown::new(),
        )
        .await;

        assert_eq!(report.retained, vec![(linked, RetainReason::DeleteFailed)]);
        assert!(target.join(".git").is_dir(), "link target left untouched");
        assert_eq!(report.deleted, vec![retired.clone()]);
        assert!(!retired.exists(), "later candidates still processed");
        assert_eq!(stats.snapshot().deleted, 1, "failed removals are not counted");
    }

    #[tokio::test]
    async fn missing_folders_are_skipped_quietly() {
        let root = tempfile::tempdir().unwrap();
        let host = CheckingHost::new(&[], &[]);
        let stats = StatsCollector::new();
        let report = reconcile(
            &host,
            "acme",
            &[root.path().join("Never Created")],
            &HashSet::new(),
            &stats,
            None,
            &Shutdown::new(),
        )
        .await;
        assert!(report.deleted.is_empty());
    }
}
