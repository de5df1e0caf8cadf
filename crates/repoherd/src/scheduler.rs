//! Bounded-concurrency batch scheduler.
//!
//! Dispatches executor invocations for a batch of tasks, never exceeding the
//! clamped parallelism, and streams per-task outcomes as they complete. No
//! ordering is guaranteed between tasks; completion order is nondeterministic
//! and callers must not assume one. All counter updates go through the stats
//! collector from a single consumer reading the results channel.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Semaphore};

use crate::executor::{ExecResult, SyncExecutor};
use crate::git::GitError;
use crate::progress::{emit, ProgressCallback, SyncProgress};
use crate::shutdown::Shutdown;
use crate::stats::StatsCollector;
use crate::types::{OutcomeKind, RepoTask, RetryTier, SyncOutcome, MAX_TASK_PARALLELISM};

struct WorkerReport {
    task: RepoTask,
    result: Result<ExecResult, GitError>,
    duration_ms: u64,
}

/// Apply the hard upper clamp to a configured parallelism value, task or
/// transfer alike. Exceeding the maximum is reduced silently with a warning
/// event, never an error.
pub fn clamp_parallelism(requested: usize, on_progress: Option<&ProgressCallback>) -> usize {
    if requested > MAX_TASK_PARALLELISM {
        tracing::warn!(requested, max = MAX_TASK_PARALLELISM, "parallelism clamped");
        emit(
            on_progress,
            SyncProgress::ParallelismClamped {
                requested,
                max: MAX_TASK_PARALLELISM,
            },
        );
        return MAX_TASK_PARALLELISM;
    }
    requested.max(1)
}

/// Run one batch of tasks under bounded concurrency.
///
/// The shutdown flag is checked before each task begins executing; tasks
/// already in flight finish (or are terminated by the executor itself when
/// the shutdown is forceful). Returns every task's outcome, already recorded
/// into `stats`.
#[allow(clippy::too_many_arguments)]
pub async fn run_batch(
    executor: Arc<dyn SyncExecutor>,
    tasks: Vec<RepoTask>,
    parallelism: usize,
    connections: usize,
    tier: RetryTier,
    stats: &StatsCollector,
    on_progress: Option<&ProgressCallback>,
    shutdown: Arc<Shutdown>,
) -> Vec<SyncOutcome> {
    if tasks.is_empty() {
        return Vec::new();
    }

    let parallelism = clamp_parallelism(parallelism, on_progress).min(tasks.len());
    // The transfer fan-out is bounded by the same ceiling; git gets this
    // value verbatim as --jobs.
    let connections = clamp_parallelism(connections, on_progress);
    emit(
        on_progress,
        SyncProgress::BatchStarted {
            tier,
            count: tasks.len(),
            parallelism,
        },
    );

    let semaphore = Arc::new(Semaphore::new(parallelism));
    let (tx, mut rx) = mpsc::channel::<WorkerReport>(tasks.len());

    for task in tasks {
        let executor = Arc::clone(&executor);
        let semaphore = Arc::clone(&semaphore);
        let shutdown = Arc::clone(&shutdown);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };

            let report = if shutdown.is_requested() {
                WorkerReport {
                    task,
                    result: Err(GitError::Canceled),
                    duration_ms: 0,
                }
            } else {
                let started = Instant::now();
                let result = executor.execute(&task, connections).await;
                WorkerReport {
                    task,
                    result,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            };

            // The receiver only goes away if the batch was abandoned.
            let _ = tx.send(report).await;
        });
    }
    drop(tx);

    let mut outcomes = Vec::new();
    while let Some(report) = rx.recv().await {
        let outcome = match report.result {
            Ok(result) => SyncOutcome {
                task: report.task,
                kind: match result {
                    ExecResult::Cloned => OutcomeKind::Cloned,
                    ExecResult::Updated => OutcomeKind::Updated,
                    ExecResult::Skipped => OutcomeKind::Skipped,
                },
                error: None,
                retryable: false,
                duration_ms: report.duration_ms,
                tier,
            },
            Err(error) => SyncOutcome {
                task: report.task,
                kind: OutcomeKind::Failed,
                retryable: error.is_retryable(),
                error: Some(error.to_string()),
                duration_ms: report.duration_ms,
                tier,
            },
        };

        stats.record(&outcome);
        if tier > RetryTier::Initial && outcome.is_success() {
            emit(
                on_progress,
                SyncProgress::TaskRecovered {
                    full_name: outcome.task.full_name.clone(),
                    tier,
                },
            );
        }
        emit(
            on_progress,
            SyncProgress::TaskFinished {
                full_name: outcome.task.full_name.clone(),
                tier,
                kind: outcome.kind,
                error: outcome.error.clone(),
                duration_ms: outcome.duration_ms,
            },
        );
        outcomes.push(outcome);
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::types::CloneMode;

    fn make_tasks(count: usize) -> Vec<RepoTask> {
        (0..count)
            .map(|i| RepoTask {
                full_name: format!("acme/repo{i}"),
                short_name: format!("repo{i}"),
                dest: PathBuf::from(format!("/tmp/g/repo{i}")),
                group: "g".into(),
                seq: i,
                mode: CloneMode::Full,
            })
            .collect()
    }

    fn collecting_callback() -> (ProgressCallback, Arc<Mutex<Vec<SyncProgress>>>) {
        let events: Arc<Mutex<Vec<SyncProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: ProgressCallback = Box::new(move |event| {
            sink.lock().unwrap().push(event);
        });
        (callback, events)
    }

    /// Tracks the high-water mark of concurrently active executions.
    struct GaugeExecutor {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl SyncExecutor for GaugeExecutor {
        async fn execute(&self, _task: &RepoTask, _c: usize) -> Result<ExecResult, GitError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(ExecResult::Cloned)
        }
    }

    struct ScriptedExecutor {
        fail: Vec<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SyncExecutor for ScriptedExecutor {
        async fn execute(&self, task: &RepoTask, _c: usize) -> Result<ExecResult, GitError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.contains(&task.short_name) {
                Err(GitError::Command {
                    operation: "clone",
                    target: task.full_name.clone(),
                    stderr: "connection reset".into(),
                })
            } else {
                Ok(ExecResult::Cloned)
            }
        }
    }

    #[tokio::test]
    async fn active_workers_never_exceed_the_parallelism() {
        let executor = Arc::new(GaugeExecutor {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let stats = StatsCollector::new();

        let outcomes = run_batch(
            Arc::clone(&executor) as Arc<dyn SyncExecutor>,
            make_tasks(20),
            4,
            1,
            RetryTier::Initial,
            &stats,
            None,
            Arc::new(Shutdown::new()),
        )
        .await;

        assert_eq!(outcomes.len(), 20);
        assert!(executor.peak.load(Ordering::SeqCst) <= 4);
        assert_eq!(stats.snapshot().cloned, 20);
    }

    #[tokio::test]
    async fn excessive_parallelism_is_clamped_with_a_warning() {
        let (callback, events) = collecting_callback();
        assert_eq!(clamp_parallelism(500, Some(&callback)), MAX_TASK_PARALLELISM);

        let clamped = events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, SyncProgress::ParallelismClamped { requested: 500, max } if *max == MAX_TASK_PARALLELISM));
        assert!(clamped, "clamping must record a warning event");

        // In-range values pass through untouched.
        assert_eq!(clamp_parallelism(8, Some(&callback)), 8);
        assert_eq!(clamp_parallelism(0, Some(&callback)), 1);
    }

    /// Records the highest connections value any execution was handed.
    struct ConnectionRecorder {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl SyncExecutor for ConnectionRecorder {
        async fn execute(&self, _task: &RepoTask, connections: usize) -> Result<ExecResult, GitError> {
            self.seen.fetch_max(connections, Ordering::SeqCst);
            Ok(ExecResult::Cloned)
        }
    }

    #[tokio::test]
    async fn transfer_connections_are_clamped_before_reaching_the_executor() {
        let executor = Arc::new(ConnectionRecorder {
            seen: AtomicUsize::new(0),
        });
        let stats = StatsCollector::new();
        let (callback, events) = collecting_callback();

        run_batch(
            Arc::clone(&executor) as Arc<dyn SyncExecutor>,
            make_tasks(3),
            2,
            500,
            RetryTier::Initial,
            &stats,
            Some(&callback),
            Arc::new(Shutdown::new()),
        )
        .await;

        assert_eq!(
            executor.seen.load(Ordering::SeqCst),
            MAX_TASK_PARALLELISM,
            "git --jobs must never exceed the hard ceiling"
        );
        let clamped = events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, SyncProgress::ParallelismClamped { requested: 500, .. }));
        assert!(clamped, "clamping must record a warning event");
    }

    #[tokio::test]
    async fn failures_are_reported_per_task_and_recorded_once() {
        let executor = Arc::new(ScriptedExecutor {
            fail: vec!["repo1".into(), "repo3".into()],
            calls: AtomicUsize::new(0),
        });
        let stats = StatsCollector::new();
        let (callback, events) = collecting_callback();

        let outcomes = run_batch(
            executor,
            make_tasks(5),
            3,
            1,
            RetryTier::Initial,
            &stats,
            Some(&callback),
            Arc::new(Shutdown::new()),
        )
        .await;

        let failed: Vec<_> = outcomes.iter().filter(|o| !o.is_success()).collect();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|o| o.retryable));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cloned, 3);
        assert_eq!(snapshot.failed, 2);

        let finished = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, SyncProgress::TaskFinished { .. }))
            .count();
        assert_eq!(finished, 5, "every task must emit a completion event");
    }

    #[tokio::test]
    async fn shutdown_prevents_new_dispatches() {
        let executor = Arc::new(ScriptedExecutor {
            fail: vec![],
            calls: AtomicUsize::new(0),
        });
        let shutdown = Arc::new(Shutdown::new());
        shutdown.request();
        let stats = StatsCollector::new();

        let outcomes = run_batch(
            Arc::clone(&executor) as Arc<dyn SyncExecutor>,
            make_tasks(4),
            2,
            1,
            RetryTier::Initial,
            &stats,
            None,
            shutdown,
        )
        .await;

        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        assert!(outcomes.iter().all(|o| o.kind == OutcomeKind::Failed));
        assert!(outcomes.iter().all(|o| !o.retryable));
    }
}
