//! End-to-end engine runs against an in-memory remote and a scripted
//! executor. The executor materializes clones as real directories so the
//! filesystem probe sees exactly what a git clone would have left behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use repoherd::engine::{self, RunOptions};
use repoherd::executor::{ExecResult, SyncExecutor};
use repoherd::git::GitError;
use repoherd::github::{HostError, RemoteHost, RemoteRepo};
use repoherd::shutdown::Shutdown;
use repoherd::types::RepoTask;
use repoherd::GroupCatalog;

struct FakeHost {
    repos: Vec<RemoteRepo>,
}

impl FakeHost {
    fn with(names: &[&str]) -> Self {
        Self {
            repos: names
                .iter()
                .map(|n| RemoteRepo::new(*n, format!("acme/{n}"), None))
                .collect(),
        }
    }
}

#[async_trait]
impl RemoteHost for FakeHost {
    async fn list_repos(&self, _owner: &str) -> Result<Vec<RemoteRepo>, HostError> {
        Ok(self.repos.clone())
    }

    async fn repo_exists(&self, _owner: &str, name: &str) -> Result<bool, HostError> {
        Ok(self.repos.iter().any(|r| r.name == name))
    }

    async fn repo_size(&self, _owner: &str, _name: &str) -> Result<Option<u64>, HostError> {
        Ok(None)
    }
}

/// Clones by creating the destination directory tree; fails each named
/// repository the scripted number of times first.
struct FakeCloner {
    failures_left: Mutex<HashMap<String, u32>>,
}

impl FakeCloner {
    fn reliable() -> Self {
        Self::flaky(&[])
    }

    fn flaky(failures: &[(&str, u32)]) -> Self {
        Self {
            failures_left: Mutex::new(
                failures
                    .iter()
                    .map(|(name, n)| (name.to_string(), *n))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl SyncExecutor for FakeCloner {
    async fn execute(&self, task: &RepoTask, _connections: usize) -> Result<ExecResult, GitError> {
        let mut failures = self.failures_left.lock().unwrap();
        if let Some(left) = failures.get_mut(&task.short_name) {
            if *left > 0 {
                *left -= 1;
                return Err(GitError::Command {
                    operation: "clone",
                    target: task.full_name.clone(),
                    stderr: "early EOF".into(),
                });
            }
        }
        std::fs::create_dir_all(task.dest.join(".git"))?;
        Ok(ExecResult::Cloned)
    }
}

const GROUP_FILE: &str = "\
# Repository groups

Owner: acme

## Backend <!-- hl-7 -->
- svcA
- svcB
";

fn setup(group_file: &str) -> (TempDir, RunOptions) {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("REPO-GROUPS.md");
    std::fs::write(&file, group_file).unwrap();
    let options = RunOptions::new(dir.path(), file);
    (dir, options)
}

async fn run(
    host: FakeHost,
    executor: FakeCloner,
    options: RunOptions,
) -> engine::RunReport {
    engine::run(
        Arc::new(host),
        Arc::new(executor),
        options,
        None,
        Arc::new(Shutdown::new()),
    )
    .await
    .unwrap()
}

fn repo_dir(root: &Path, name: &str) -> PathBuf {
    root.join("Backend (hl-7)").join(name)
}

#[tokio::test]
async fn clean_run_clones_everything_and_writes_no_artifact() {
    let (dir, options) = setup(GROUP_FILE);
    let report = run(FakeHost::with(&["svcA", "svcB"]), FakeCloner::reliable(), options).await;

    assert_eq!(report.stats.cloned, 2);
    assert_eq!(report.stats.failed, 0);
    assert!(report.is_clean());
    assert!(report.artifact.is_none());
    assert!(repo_dir(dir.path(), "svcA").join(".git").is_dir());
    assert!(repo_dir(dir.path(), "svcB").join(".git").is_dir());
}

#[tokio::test]
async fn second_run_is_idempotent() {
    let (dir, options) = setup(GROUP_FILE);
    run(
        FakeHost::with(&["svcA", "svcB"]),
        FakeCloner::reliable(),
        options.clone(),
    )
    .await;

    let report = run(FakeHost::with(&["svcA", "svcB"]), FakeCloner::reliable(), options).await;
    assert_eq!(report.stats.cloned, 0);
    assert_eq!(report.stats.skipped, 2, "present repositories are skipped");
    assert!(repo_dir(dir.path(), "svcA").join(".git").is_dir());
}

#[tokio::test]
async fn terminal_failures_land_in_a_replayable_artifact() {
    let (dir, options) = setup(GROUP_FILE);
    // svcB fails the initial batch, the group sweep and the global sweep.
    let report = run(
        FakeHost::with(&["svcA", "svcB"]),
        FakeCloner::flaky(&[("svcB", 99)]),
        options,
    )
    .await;

    assert_eq!(report.stats.cloned, 1);
    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].short_name, "svcB");

    let artifact = report.artifact.expect("artifact must be written");
    assert_eq!(artifact, dir.path().join("FAILED-REPOS.md"));
    let replay = GroupCatalog::load(&artifact, None).unwrap();
    assert_eq!(replay.owner, "acme");
    let backend = replay.group("Backend").unwrap();
    assert_eq!(backend.tag.as_deref(), Some("hl-7"), "tag carried over");
    assert_eq!(backend.members, vec!["svcB"]);
}

#[tokio::test]
async fn failures_recover_across_retry_tiers() {
    let (_dir, options) = setup(GROUP_FILE);
    // svcB fails the initial batch and the group sweep, then succeeds in the
    // global sweep.
    let report = run(
        FakeHost::with(&["svcA", "svcB"]),
        FakeCloner::flaky(&[("svcB", 2)]),
        options,
    )
    .await;

    assert_eq!(report.stats.cloned, 2);
    assert_eq!(report.stats.failed, 0);
    assert_eq!(report.stats.recovered, 1);
    assert!(report.artifact.is_none());
}

#[tokio::test]
async fn members_missing_from_the_remote_fail_immediately() {
    let (dir, options) = setup(GROUP_FILE);
    // Remote account only has svcA.
    let report = run(FakeHost::with(&["svcA"]), FakeCloner::reliable(), options).await;

    assert_eq!(report.stats.cloned, 1);
    assert_eq!(report.stats.missing, 1);
    assert_eq!(report.stats.failed, 1);
    assert!(!repo_dir(dir.path(), "svcB").exists());

    let replay = GroupCatalog::load(&report.artifact.unwrap(), None).unwrap();
    assert_eq!(replay.group("Backend").unwrap().members, vec!["svcB"]);
}

#[tokio::test]
async fn a_clean_run_removes_the_stale_artifact() {
    let (dir, options) = setup(GROUP_FILE);
    let stale = dir.path().join("FAILED-REPOS.md");
    std::fs::write(&stale, "Owner: acme\n\n## Backend\n- svcB\n").unwrap();

    let report = run(FakeHost::with(&["svcA", "svcB"]), FakeCloner::reliable(), options).await;
    assert!(report.is_clean());
    assert!(!stale.exists(), "stale artifact must not survive a clean run");
}

#[tokio::test]
async fn reconcile_deletes_confirmed_orphans_only() {
    let (dir, mut options) = setup(GROUP_FILE);
    options.reconcile = true;

    // A leftover clone whose remote repository no longer exists, plus a
    // plain directory that must never be touched.
    let orphan = repo_dir(dir.path(), "retired");
    std::fs::create_dir_all(orphan.join(".git")).unwrap();
    let scratch = repo_dir(dir.path(), "scratch-notes");
    std::fs::create_dir_all(&scratch).unwrap();

    let report = run(FakeHost::with(&["svcA", "svcB"]), FakeCloner::reliable(), options).await;

    assert_eq!(report.stats.deleted, 1);
    assert!(!orphan.exists());
    assert!(scratch.exists());
    assert!(repo_dir(dir.path(), "svcA").exists());
    assert!(repo_dir(dir.path(), "svcB").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn reconcile_trouble_never_costs_the_artifact() {
    let (dir, mut options) = setup(GROUP_FILE);
    options.reconcile = true;

    // An orphan the remote confirms gone but whose removal fails: the clone
    // sits behind a symlink, which remove_dir_all refuses to follow.
    let target = dir.path().join("elsewhere");
    std::fs::create_dir_all(target.join(".git")).unwrap();
    let orphan = repo_dir(dir.path(), "linked");
    std::fs::create_dir_all(orphan.parent().unwrap()).unwrap();
    std::os::unix::fs::symlink(&target, &orphan).unwrap();

    // svcB fails every tier, so the run has something to report.
    let report = run(
        FakeHost::with(&["svcA", "svcB"]),
        FakeCloner::flaky(&[("svcB", 99)]),
        options,
    )
    .await;

    assert_eq!(report.stats.deleted, 0);
    assert!(target.join(".git").is_dir(), "orphan retained on removal failure");

    let artifact = report
        .artifact
        .expect("artifact written despite the failed removal");
    let replay = GroupCatalog::load(&artifact, None).unwrap();
    assert_eq!(replay.group("Backend").unwrap().members, vec!["svcB"]);
}

#[tokio::test]
async fn list_only_plans_without_touching_the_filesystem() {
    let (dir, mut options) = setup(GROUP_FILE);
    options.list_only = true;

    let report = run(FakeHost::with(&["svcA", "svcB"]), FakeCloner::reliable(), options).await;
    assert_eq!(report.planned.len(), 2);
    assert_eq!(report.stats.cloned, 0);
    assert!(!repo_dir(dir.path(), "svcA").exists());
    assert!(report.artifact.is_none());
}

#[tokio::test]
async fn unknown_group_selection_is_fatal() {
    let (_dir, mut options) = setup(GROUP_FILE);
    options.groups = vec!["Nope".to_string()];

    let err = engine::run(
        Arc::new(FakeHost::with(&["svcA"])),
        Arc::new(FakeCloner::reliable()),
        options,
        None,
        Arc::new(Shutdown::new()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, engine::EngineError::Catalog(_)));
}
