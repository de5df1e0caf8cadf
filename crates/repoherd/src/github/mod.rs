//! Remote account service: the GitHub-facing side of the engine.
//!
//! The engine consumes exactly three remote operations: one bulk "list all
//! repositories for the account" call, a single-repository existence check
//! and a single-repository size lookup. [`RemoteHost`] is the seam; tests
//! substitute an in-memory implementation, production uses [`GitHubHost`].

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

pub use client::GitHubHost;
pub use error::HostError;
pub use types::RemoteRepo;

/// Remote hosting service operations the engine depends on.
#[async_trait]
pub trait RemoteHost: Send + Sync {
    /// Bulk listing of every repository owned by the account. Called once
    /// per run to build the remote index; failure aborts the run.
    async fn list_repos(&self, owner: &str) -> Result<Vec<RemoteRepo>, HostError>;

    /// Whether `owner/name` currently exists on the remote. Used for the
    /// index cache-miss probe and the reconciler's pre-deletion re-check.
    async fn repo_exists(&self, owner: &str, name: &str) -> Result<bool, HostError>;

    /// Size of `owner/name` in bytes, when the remote reports one.
    async fn repo_size(&self, owner: &str, name: &str) -> Result<Option<u64>, HostError>;
}
