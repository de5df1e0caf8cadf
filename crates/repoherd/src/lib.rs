//! repoherd - keeps a local tree of git clones in step with a GitHub account.
//!
//! Repositories are organized into named groups by a plain-text group file.
//! For every requested group the engine diffs the local filesystem against a
//! remote index built from one bulk listing call, clones what is missing under
//! bounded concurrency, escalates failures across retry tiers, and finally
//! reconciles local directories that no longer exist remotely.
//!
//! The flow is: [`catalog::GroupCatalog`] + [`index::RemoteIndex`] ->
//! [`diff`] -> [`scheduler`] dispatching a [`executor::SyncExecutor`] ->
//! [`retry`] sweeps -> [`reconcile`] -> summary via [`stats::StatsCollector`].
//! [`engine::run`] ties these together for the CLI.

pub mod catalog;
pub mod diff;
pub mod engine;
pub mod executor;
pub mod fsck;
pub mod git;
pub mod github;
pub mod index;
pub mod probe;
pub mod progress;
pub mod pull;
pub mod reconcile;
pub mod retry;
pub mod scheduler;
pub mod shutdown;
pub mod stats;
pub mod types;

pub use catalog::{CatalogError, GroupCatalog, RepoGroup};
pub use engine::{run, EngineError, RunOptions, RunReport};
pub use executor::{ExecResult, GitExecutor, SyncExecutor};
pub use git::GitError;
pub use github::{GitHubHost, HostError, RemoteHost, RemoteRepo};
pub use index::{RemoteIndex, RemoteIndexEntry};
pub use probe::LocalRepoState;
pub use progress::{emit, ProgressCallback, SyncProgress};
pub use shutdown::Shutdown;
pub use stats::{RunStatistics, StatsCollector};
pub use types::{
    CloneMode, OutcomeKind, RepoTask, RetryTier, SizePolicy, SyncOutcome, MAX_TASK_PARALLELISM,
};
