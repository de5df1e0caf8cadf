//! git subprocess plumbing.
//!
//! The actual transfer mechanism is the system `git` binary, which brings
//! along whatever credentials the user has configured (ssh-agent keys,
//! credential helpers, tokens). Every child process is spawned with
//! `kill_on_drop` and awaited under `select!` with the shutdown signal, so
//! forceful termination reaches the external process itself.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

use crate::shutdown::Shutdown;
use crate::types::CloneMode;

/// Connect timeout for the one-shot SSH availability probe.
const SSH_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors from git subprocess operations.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {operation} failed for {target}: {stderr}")]
    Command {
        operation: &'static str,
        target: String,
        stderr: String,
    },

    #[error("destination {0} exists and is not a git repository")]
    ConflictingDestination(PathBuf),

    #[error("canceled by shutdown request")]
    Canceled,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GitError {
    /// Whether a wider retry tier may recover from this failure. Structural
    /// conditions and cancellations are terminal; command failures are
    /// usually transient network or auth-at-transfer faults.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GitError::Command { .. } | GitError::Timeout(_))
    }
}

/// Which transfer protocol to clone over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Ssh,
    Https,
}

impl Transport {
    /// Remote URL for `owner/name` over this transport.
    pub fn url(&self, full_name: &str) -> String {
        match self {
            Transport::Ssh => format!("git@github.com:{full_name}.git"),
            Transport::Https => format!("https://github.com/{full_name}.git"),
        }
    }
}

/// Detect whether SSH credentials for github.com are usable, via a silent
/// one-shot handshake. Detected once per run; any failure means HTTPS.
pub async fn detect_transport() -> Transport {
    let probe = Command::new("ssh")
        .args(["-o", "BatchMode=yes", "-o", "ConnectTimeout=2", "-T", "git@github.com"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(SSH_PROBE_TIMEOUT, probe).await {
        Ok(Ok(output)) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            // GitHub refuses the shell but confirms the key.
            if text.contains("successfully authenticated") {
                Transport::Ssh
            } else {
                Transport::Https
            }
        }
        _ => Transport::Https,
    }
}

fn pack_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
}

/// Clone `url` into `dest` with `connections` parallel transfer jobs.
pub async fn clone_repo(
    url: &str,
    dest: &Path,
    mode: CloneMode,
    connections: usize,
    shutdown: &Shutdown,
) -> Result<(), GitError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut cmd = Command::new("git");
    cmd.args([
        "-c",
        "http.postBuffer=524288000",
        "-c",
        "http.lowSpeedLimit=0",
        "-c",
        "http.lowSpeedTime=0",
        "-c",
        "core.compression=1",
    ]);
    cmd.arg("-c").arg(format!("pack.threads={}", pack_threads()));
    cmd.args(["clone", "--no-progress"]);
    cmd.arg("--jobs").arg(connections.to_string());
    if mode == CloneMode::Shallow {
        cmd.args(["--depth", "1"]);
    }
    cmd.arg(url).arg(dest);

    run(cmd, "clone", url.to_string(), shutdown).await
}

/// Fast-forward update of an existing local repository.
pub async fn pull_repo(path: &Path, shutdown: &Shutdown) -> Result<(), GitError> {
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(path);
    cmd.args(["pull", "--ff-only", "--no-rebase", "--no-stat", "--no-progress"]);
    run(cmd, "pull", path.display().to_string(), shutdown).await
}

/// Integrity check via `git fsck --strict`, bounded by `limit`.
///
/// Dangling objects are normal after clones and fetches and do not count as
/// corruption.
pub async fn fsck_repo(path: &Path, limit: Duration, shutdown: &Shutdown) -> Result<(), GitError> {
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(path);
    cmd.args(["fsck", "--no-progress", "--strict"]);

    let checked = tokio::time::timeout(limit, run(cmd, "fsck", path.display().to_string(), shutdown));
    match checked.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(GitError::Command { stderr, .. })) if stderr.to_lowercase().contains("dangling") => {
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(GitError::Timeout(limit)),
    }
}

/// Remove a partially-written destination so a retried attempt never starts
/// from corrupt state. Best effort: a directory that cannot be removed will
/// surface again as a conflict on the next attempt.
pub async fn cleanup_partial(dest: &Path) {
    if !dest.exists() {
        return;
    }
    if let Err(error) = tokio::fs::remove_dir_all(dest).await {
        tracing::warn!(path = %dest.display(), %error, "failed to clean partial destination");
    }
}

async fn run(
    mut cmd: Command,
    operation: &'static str,
    target: String,
    shutdown: &Shutdown,
) -> Result<(), GitError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|source| GitError::Spawn {
        command: format!("git {operation}"),
        source,
    })?;

    tokio::select! {
        output = child.wait_with_output() => {
            let output = output?;
            if output.status.success() {
                Ok(())
            } else {
                Err(GitError::Command {
                    operation,
                    target,
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                })
            }
        }
        // Dropping the wait future drops the child handle; kill_on_drop
        // terminates the external process.
        () = shutdown.wait() => Err(GitError::Canceled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_urls() {
        assert_eq!(
            Transport::Ssh.url("acme/svcA"),
            "git@github.com:acme/svcA.git"
        );
        assert_eq!(
            Transport::Https.url("acme/svcA"),
            "https://github.com/acme/svcA.git"
        );
    }

    #[test]
    fn retryable_classification() {
        assert!(GitError::Command {
            operation: "clone",
            target: "x".into(),
            stderr: "timed out".into()
        }
        .is_retryable());
        assert!(!GitError::Canceled.is_retryable());
        assert!(!GitError::ConflictingDestination(PathBuf::from("/x")).is_retryable());
    }
}
