//! Sync executor: performs one clone for one task.
//!
//! One scheduler-visible attempt internally covers the transport fallback
//! and a small number of immediate retries with a fixed delay; only after
//! those are exhausted does a failure surface to the scheduler and become
//! eligible for the wider retry tiers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::git::{self, GitError, Transport};
use crate::probe::{self, LocalRepoState};
use crate::shutdown::Shutdown;
use crate::types::{RepoTask, CLONE_ATTEMPTS, CLONE_RETRY_DELAY};

/// What one successful execution did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecResult {
    Cloned,
    Updated,
    Skipped,
}

/// The unit of work the scheduler dispatches. Production is [`GitExecutor`];
/// tests substitute scripted implementations.
#[async_trait]
pub trait SyncExecutor: Send + Sync {
    async fn execute(&self, task: &RepoTask, connections: usize) -> Result<ExecResult, GitError>;
}

/// Clones repositories with the system git binary.
pub struct GitExecutor {
    shutdown: Arc<Shutdown>,
    attempts: u32,
    retry_delay: Duration,
    transport: OnceCell<Transport>,
}

impl GitExecutor {
    pub fn new(shutdown: Arc<Shutdown>) -> Self {
        Self {
            shutdown,
            attempts: CLONE_ATTEMPTS,
            retry_delay: CLONE_RETRY_DELAY,
            transport: OnceCell::new(),
        }
    }

    #[cfg(test)]
    fn with_timing(shutdown: Arc<Shutdown>, attempts: u32, retry_delay: Duration) -> Self {
        Self {
            shutdown,
            attempts,
            retry_delay,
            transport: OnceCell::new(),
        }
    }

    /// Preferred transport, detected once per run and cached.
    async fn transport(&self) -> Transport {
        *self
            .transport
            .get_or_init(|| async {
                let transport = git::detect_transport().await;
                tracing::info!(?transport, "selected clone transport");
                transport
            })
            .await
    }

    /// One attempt: preferred transport, with a single HTTPS fallback when
    /// the SSH transport specifically fails. The fallback is part of the
    /// attempt, not a retry tier.
    async fn attempt(&self, task: &RepoTask, connections: usize) -> Result<(), GitError> {
        let transport = self.transport().await;
        let first = git::clone_repo(
            &transport.url(&task.full_name),
            &task.dest,
            task.mode,
            connections,
            &self.shutdown,
        )
        .await;

        match first {
            Ok(()) => Ok(()),
            Err(e @ GitError::Canceled) => Err(e),
            Err(ssh_error) if transport == Transport::Ssh => {
                tracing::debug!(repo = %task.full_name, %ssh_error, "ssh clone failed; falling back to https");
                git::cleanup_partial(&task.dest).await;
                git::clone_repo(
                    &Transport::Https.url(&task.full_name),
                    &task.dest,
                    task.mode,
                    connections,
                    &self.shutdown,
                )
                .await
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl SyncExecutor for GitExecutor {
    async fn execute(&self, task: &RepoTask, connections: usize) -> Result<ExecResult, GitError> {
        // Re-probe at execution time; the state may have changed since the
        // diff ran.
        match probe::probe(&task.dest) {
            LocalRepoState::ValidRepository => return Ok(ExecResult::Skipped),
            LocalRepoState::ConflictingDirectory => {
                return Err(GitError::ConflictingDestination(task.dest.clone()));
            }
            LocalRepoState::Absent => {}
        }

        let mut attempt = 1u32;
        loop {
            if self.shutdown.is_requested() {
                return Err(GitError::Canceled);
            }

            match self.attempt(task, connections).await {
                Ok(()) => return Ok(ExecResult::Cloned),
                Err(error) => {
                    // Never leave partial state for a later attempt.
                    git::cleanup_partial(&task.dest).await;
                    if attempt >= self.attempts || !error.is_retryable() {
                        return Err(error);
                    }
                    tracing::debug!(
                        repo = %task.full_name,
                        attempt,
                        %error,
                        "clone attempt failed; retrying after delay"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
