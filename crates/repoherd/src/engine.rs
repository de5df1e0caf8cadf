//! Run orchestration: one full sync from catalog to summary.
//!
//! The engine owns the order of operations and nothing else; every step is
//! implemented by its own module. Catalog and remote listing failures abort
//! the run before any task executes. Per-task failures never do; they flow
//! through the retry tiers and end up in the failed-task artifact.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::catalog::{self, CatalogError, GroupCatalog};
use crate::diff;
use crate::executor::SyncExecutor;
use crate::fsck;
use crate::github::{HostError, RemoteHost};
use crate::index::RemoteIndex;
use crate::progress::{emit, ProgressCallback, SyncProgress};
use crate::reconcile;
use crate::retry::{self, Partition};
use crate::scheduler;
use crate::shutdown::Shutdown;
use crate::stats::{RunStatistics, StatsCollector};
use crate::types::{
    OutcomeKind, RepoTask, RetryTier, SizePolicy, SyncOutcome, DEFAULT_TASK_PARALLELISM,
    DEFAULT_TRANSFER_PARALLELISM,
};

/// Default file name of the failed-task artifact, written next to the root.
pub const FAILED_ARTIFACT_NAME: &str = "FAILED-REPOS.md";

/// Fatal errors that abort a run before (or between) tasks. Per-task failures
/// are not errors; they are reported through [`RunReport`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("remote listing failed: {0}")]
    RemoteListing(#[source] HostError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Everything configurable about one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Root under which group folders live.
    pub root: PathBuf,
    /// Path of the group file.
    pub group_file: PathBuf,
    /// Overrides the group file's `Owner:` line when set.
    pub owner_override: Option<String>,
    /// Requested group names; empty means every group.
    pub groups: Vec<String>,
    pub task_parallelism: usize,
    pub transfer_parallelism: usize,
    /// Plan and classify only; execute nothing.
    pub list_only: bool,
    /// Run integrity checks over everything cloned this run.
    pub verify: bool,
    /// Delete local clones whose remote repository is gone.
    pub reconcile: bool,
    /// Where to write the failed-task artifact; defaults to
    /// [`FAILED_ARTIFACT_NAME`] under the root.
    pub artifact_path: Option<PathBuf>,
    pub size_policy: SizePolicy,
}

impl RunOptions {
    pub fn new(root: impl Into<PathBuf>, group_file: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            group_file: group_file.into(),
            owner_override: None,
            groups: Vec::new(),
            task_parallelism: DEFAULT_TASK_PARALLELISM,
            transfer_parallelism: DEFAULT_TRANSFER_PARALLELISM,
            list_only: false,
            verify: false,
            reconcile: false,
            artifact_path: None,
            size_policy: SizePolicy::default(),
        }
    }

    fn artifact_path(&self) -> PathBuf {
        self.artifact_path
            .clone()
            .unwrap_or_else(|| self.root.join(FAILED_ARTIFACT_NAME))
    }
}

/// Summary of a finished run.
#[derive(Debug)]
pub struct RunReport {
    pub stats: RunStatistics,
    /// Tasks left in terminal failed state, in catalog order.
    pub failed: Vec<RepoTask>,
    /// Artifact path, when one was written this run.
    pub artifact: Option<PathBuf>,
    /// Tasks a `list_only` run would have executed.
    pub planned: Vec<RepoTask>,
    pub elapsed: Duration,
}

impl RunReport {
    /// Whether every task ended in a non-failed state.
    pub fn is_clean(&self) -> bool {
        self.stats.failed == 0
    }
}

/// Execute one full sync run.
pub async fn run(
    host: Arc<dyn RemoteHost>,
    executor: Arc<dyn SyncExecutor>,
    options: RunOptions,
    on_progress: Option<&ProgressCallback>,
    shutdown: Arc<Shutdown>,
) -> Result<RunReport, EngineError> {
    let catalog = GroupCatalog::load(&options.group_file, options.owner_override.as_deref())?;
    let groups: Vec<_> = catalog
        .select(&options.groups)?
        .into_iter()
        .cloned()
        .collect();

    emit(
        on_progress,
        SyncProgress::BuildingIndex {
            owner: catalog.owner.clone(),
        },
    );
    let index = RemoteIndex::build(host.as_ref(), &catalog.owner)
        .await
        .map_err(EngineError::RemoteListing)?;
    emit(on_progress, SyncProgress::IndexReady { total: index.len() });

    let stats = StatsCollector::new();
    let mut synced: HashSet<PathBuf> = HashSet::new();
    let mut planned: Vec<RepoTask> = Vec::new();
    let mut terminal: Vec<RepoTask> = Vec::new();
    let mut global_pending: Vec<RepoTask> = Vec::new();
    let mut cloned: Vec<RepoTask> = Vec::new();

    for group in &groups {
        let folder = group.folder(&options.root);
        // Every listed member counts as intentional local state, whether or
        // not it needed work this run.
        for member in &group.members {
            synced.insert(folder.join(member));
        }

        let group_diff = diff::analyze_group(
            &index,
            host.as_ref(),
            group,
            &options.root,
            &options.size_policy,
        )
        .await;

        emit(
            on_progress,
            SyncProgress::GroupPlanned {
                group: group.name.clone(),
                to_clone: group_diff.tasks.len(),
                present: group_diff.present.len(),
                conflicting: group_diff.conflicting.len(),
                missing: group_diff.missing.len(),
            },
        );
        stats.record_present(group_diff.present.len());
        stats.record_conflicting(group_diff.conflicting.len());
        stats.record_missing(group_diff.missing.len());
        stats.record_huge(group_diff.huge);
        terminal.extend(group_diff.missing);

        if options.list_only {
            planned.extend(group_diff.tasks);
            continue;
        }

        let outcomes = scheduler::run_batch(
            Arc::clone(&executor),
            group_diff.tasks,
            options.task_parallelism,
            options.transfer_parallelism,
            RetryTier::Initial,
            &stats,
            on_progress,
            Arc::clone(&shutdown),
        )
        .await;
        collect_cloned(&outcomes, &mut cloned);
        let split = Partition::from_outcomes(outcomes);
        terminal.extend(split.terminal);

        let after_group = retry::retry_sweep(
            RetryTier::Group,
            split.retryable,
            Arc::clone(&executor),
            options.task_parallelism,
            options.transfer_parallelism,
            &stats,
            on_progress,
            Arc::clone(&shutdown),
        )
        .await;
        collect_cloned(&after_group.succeeded, &mut cloned);
        terminal.extend(after_group.terminal);
        global_pending.extend(after_group.retryable);
    }

    if options.list_only {
        return Ok(RunReport {
            stats: stats.snapshot(),
            failed: Vec::new(),
            artifact: None,
            planned,
            elapsed: stats.elapsed(),
        });
    }

    // Last chance for anything still failed, across all groups at once.
    let after_global = retry::retry_sweep(
        RetryTier::Global,
        global_pending,
        Arc::clone(&executor),
        options.task_parallelism,
        options.transfer_parallelism,
        &stats,
        on_progress,
        Arc::clone(&shutdown),
    )
    .await;
    collect_cloned(&after_global.succeeded, &mut cloned);
    terminal.extend(after_global.terminal);
    terminal.extend(after_global.retryable);

    if options.verify {
        let failures = fsck::check_repos(
            std::mem::take(&mut cloned),
            options.task_parallelism,
            &stats,
            on_progress,
            Arc::clone(&shutdown),
        )
        .await;
        terminal.extend(failures.into_iter().map(|f| f.task));
    }

    if options.reconcile && !shutdown.is_requested() {
        reconcile::reconcile(
            host.as_ref(),
            &catalog.owner,
            &catalog.group_folders(&options.root),
            &synced,
            &stats,
            on_progress,
            &shutdown,
        )
        .await;
    }

    terminal.sort_by(|a, b| (&a.group, a.seq).cmp(&(&b.group, b.seq)));
    let artifact_path = options.artifact_path();
    let written = catalog::write_failed_artifact(&artifact_path, &catalog, &terminal)?;
    let artifact = if written > 0 {
        emit(
            on_progress,
            SyncProgress::ArtifactWritten {
                path: artifact_path.clone(),
                count: written,
            },
        );
        Some(artifact_path)
    } else {
        None
    };

    Ok(RunReport {
        stats: stats.snapshot(),
        failed: terminal,
        artifact,
        planned,
        elapsed: stats.elapsed(),
    })
}

fn collect_cloned(outcomes: &[SyncOutcome], cloned: &mut Vec<RepoTask>) {
    cloned.extend(
        outcomes
            .iter()
            .filter(|o| o.kind == OutcomeKind::Cloned)
            .map(|o| o.task.clone()),
    );
}
