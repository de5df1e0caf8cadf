//! repoherd CLI - keeps a local tree of git clones in step with a GitHub
//! account.

mod config;
mod progress;
mod shutdown;

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use repoherd::engine::{self, RunOptions};
use repoherd::executor::GitExecutor;
use repoherd::github::GitHubHost;
use repoherd::pull::PullExecutor;
use repoherd::stats::{RunStatistics, StatsCollector};
use repoherd::{fsck, pull, GroupCatalog, RemoteIndex, Shutdown};

use crate::progress::ProgressReporter;

#[derive(Parser)]
#[command(name = "repoherd")]
#[command(version)]
#[command(about = "Mirror a GitHub account into grouped local clones")]
#[command(
    long_about = "Repoherd reads a plain-text group file mapping named groups to \
repositories, diffs the local tree against the account's remote listing, and \
clones whatever is missing under bounded concurrency. Failures escalate \
through retry tiers and whatever still fails is written back in the same \
group-file grammar, ready to replay."
)]
#[command(after_long_help = r#"EXAMPLES
    Sync every group under the configured root:
        $ repoherd run

    Sync one group with more parallel clones:
        $ repoherd run -g Backend -t 12

    See what a run would do without cloning:
        $ repoherd run --list-only

    Replay a previous run's failures:
        $ repoherd run -f FAILED-REPOS.md

    Fast-forward update everything already cloned:
        $ repoherd pull

CONFIGURATION
    Repoherd reads configuration from:
      1. ~/.config/repoherd/config.toml (or $XDG_CONFIG_HOME/repoherd/config.toml)
      2. ./repoherd.toml
      3. Environment variables (REPOHERD_* prefix)

ENVIRONMENT VARIABLES
    REPOHERD_GITHUB_TOKEN     GitHub personal access token (optional)
    REPOHERD_SYNC_ROOT        Root directory the group folders live under
    REPOHERD_SYNC_TASKS       Repositories processed at once
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand that walks the group file.
#[derive(Debug, Clone, Args)]
struct CommonOptions {
    /// Group name(s) to operate on (default: all groups)
    #[arg(short = 'g', long = "group")]
    groups: Vec<String>,

    /// Group file path (default: <root>/REPO-GROUPS.md)
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Root directory the group folders live under (default from config or .)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Account owner, overriding the group file's `Owner:` line
    #[arg(long)]
    owner: Option<String>,

    /// Repositories processed at once (default from config or 5)
    #[arg(short = 't', long)]
    tasks: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone everything the remote account has that the local tree lacks
    Run {
        #[command(flatten)]
        opts: CommonOptions,

        /// Parallel transfer connections per clone (git clone --jobs)
        #[arg(short = 'c', long)]
        connections: Option<usize>,

        /// Plan and classify only - clone nothing
        #[arg(short = 'n', long)]
        list_only: bool,

        /// Run git fsck over everything cloned this run
        #[arg(long)]
        verify: bool,

        /// Keep local clones whose remote repository is gone
        #[arg(long)]
        no_delete: bool,
    },
    /// Fast-forward update repositories that already exist locally
    Pull {
        #[command(flatten)]
        opts: CommonOptions,
    },
    /// Integrity-check local repositories of the selected groups
    Check {
        #[command(flatten)]
        opts: CommonOptions,
    },
    /// Append remote repositories unknown to the group file to its
    /// Unassigned section
    Refresh {
        /// Group file path (default: <root>/REPO-GROUPS.md)
        #[arg(short = 'f', long)]
        file: Option<PathBuf>,

        /// Root directory (only used to locate the default group file)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Account owner, overriding the group file's `Owner:` line
        #[arg(long)]
        owner: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Structured logging only when not connected to a TTY; interactive runs
    // get progress bars instead.
    if !Term::stdout().is_term() {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("repoherd=info,repoherd_cli=info"));
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config = config::Config::load();
    let shutdown = Arc::new(Shutdown::new());
    shutdown::setup_shutdown_handler(Arc::clone(&shutdown));

    let result = match cli.command {
        Commands::Run {
            opts,
            connections,
            list_only,
            verify,
            no_delete,
        } => handle_run(&config, shutdown, opts, connections, list_only, verify, no_delete).await,
        Commands::Pull { opts } => handle_pull(&config, shutdown, opts).await,
        Commands::Check { opts } => handle_check(&config, shutdown, opts).await,
        Commands::Refresh { file, root, owner } => {
            handle_refresh(&config, file, root, owner).await
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            if Term::stdout().is_term() {
                eprintln!("error: {error}");
            } else {
                tracing::error!(%error, "fatal");
            }
            ExitCode::FAILURE
        }
    }
}

fn resolve_paths(config: &config::Config, opts: &CommonOptions) -> (PathBuf, PathBuf) {
    let root = opts.root.clone().unwrap_or_else(|| config.root());
    let file = opts.file.clone().unwrap_or_else(|| config.group_file(&root));
    (root, file)
}

#[allow(clippy::too_many_arguments)]
async fn handle_run(
    config: &config::Config,
    shutdown: Arc<Shutdown>,
    opts: CommonOptions,
    connections: Option<usize>,
    list_only: bool,
    verify: bool,
    no_delete: bool,
) -> Result<bool, Box<dyn Error>> {
    let (root, file) = resolve_paths(config, &opts);
    let host = Arc::new(GitHubHost::new(config.github_token().as_deref())?);
    let executor = Arc::new(GitExecutor::new(Arc::clone(&shutdown)));

    let mut options = RunOptions::new(root, file);
    options.owner_override = opts.owner;
    options.groups = opts.groups;
    options.task_parallelism = opts.tasks.unwrap_or(config.sync.tasks);
    options.transfer_parallelism = connections.unwrap_or(config.sync.connections);
    options.list_only = list_only;
    options.verify = verify;
    options.reconcile = !no_delete && !list_only;

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();
    let report = engine::run(host, executor, options, Some(&callback), shutdown).await?;
    reporter.finish();

    if list_only {
        let is_tty = Term::stdout().is_term();
        for task in &report.planned {
            if is_tty {
                println!("{}: {} -> {}", task.group, task.full_name, task.dest.display());
            } else {
                tracing::info!(group = %task.group, repo = %task.full_name, dest = %task.dest.display(), "would clone");
            }
        }
        return Ok(true);
    }

    print_summary(&report.stats, report.elapsed);
    Ok(report.is_clean())
}

async fn handle_pull(
    config: &config::Config,
    shutdown: Arc<Shutdown>,
    opts: CommonOptions,
) -> Result<bool, Box<dyn Error>> {
    let (root, file) = resolve_paths(config, &opts);
    let catalog = GroupCatalog::load(&file, opts.owner.as_deref())?;

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();
    let stats = StatsCollector::new();

    pull::run_pull(
        Arc::new(PullExecutor::new(Arc::clone(&shutdown))),
        &catalog,
        &opts.groups,
        &root,
        opts.tasks.unwrap_or(config.sync.tasks),
        &stats,
        Some(&callback),
        shutdown,
    )
    .await?;
    reporter.finish();

    let snapshot = stats.snapshot();
    print_summary(&snapshot, stats.elapsed());
    Ok(snapshot.failed == 0)
}

async fn handle_check(
    config: &config::Config,
    shutdown: Arc<Shutdown>,
    opts: CommonOptions,
) -> Result<bool, Box<dyn Error>> {
    let (root, file) = resolve_paths(config, &opts);
    let catalog = GroupCatalog::load(&file, opts.owner.as_deref())?;
    let tasks = pull::plan_pull(&catalog, &opts.groups, &root)?;
    let total = tasks.len();

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();
    let stats = StatsCollector::new();

    let failures = fsck::check_repos(
        tasks,
        opts.tasks.unwrap_or(config.sync.tasks),
        &stats,
        Some(&callback),
        shutdown,
    )
    .await;
    reporter.finish();

    let is_tty = Term::stdout().is_term();
    if is_tty {
        if failures.is_empty() {
            println!("{total} repositories checked, all healthy");
        } else {
            for failure in &failures {
                println!("✗ {}: {}", failure.task.full_name, failure.error);
            }
            println!("{} of {total} repositories failed the check", failures.len());
        }
    } else {
        tracing::info!(total, failed = failures.len(), "check complete");
    }
    Ok(failures.is_empty())
}

async fn handle_refresh(
    config: &config::Config,
    file: Option<PathBuf>,
    root: Option<PathBuf>,
    owner: Option<String>,
) -> Result<bool, Box<dyn Error>> {
    let root = root.unwrap_or_else(|| config.root());
    let file = file.unwrap_or_else(|| config.group_file(&root));
    let catalog = GroupCatalog::load(&file, owner.as_deref())?;

    let host = GitHubHost::new(config.github_token().as_deref())?;
    let index = RemoteIndex::build(&host, &catalog.owner).await?;

    let known: Vec<String> = catalog
        .groups
        .iter()
        .flat_map(|g| g.members.iter().cloned())
        .collect();
    let unknown = index.unknown_names(&known);

    let content = std::fs::read_to_string(&file)?;
    let (updated, added) = repoherd::catalog::merge_unassigned(&content, &unknown);
    if added > 0 {
        std::fs::write(&file, updated)?;
    }

    if Term::stdout().is_term() {
        match added {
            0 => println!("group file already covers all {} remote repositories", index.len()),
            n => println!("added {n} repositories to the Unassigned group"),
        }
    } else {
        tracing::info!(added, remote_total = index.len(), "refresh complete");
    }
    Ok(true)
}

fn print_summary(stats: &RunStatistics, elapsed: Duration) {
    if Term::stdout().is_term() {
        println!();
        println!(
            "cloned {}, updated {}, skipped {}, failed {} ({} recovered)",
            stats.cloned, stats.updated, stats.skipped, stats.failed, stats.recovered
        );
        if stats.missing > 0 {
            println!("{} listed repositories do not exist remotely", stats.missing);
        }
        if stats.conflicting > 0 {
            println!(
                "{} destinations are occupied by non-repository directories",
                stats.conflicting
            );
        }
        if stats.deleted > 0 {
            println!("{} local clones deleted (remote gone)", stats.deleted);
        }
        if stats.huge > 0 {
            println!("{} repositories above the huge-size threshold", stats.huge);
        }
        println!("done in {:.1}s", elapsed.as_secs_f64());
    } else {
        tracing::info!(
            cloned = stats.cloned,
            updated = stats.updated,
            skipped = stats.skipped,
            failed = stats.failed,
            recovered = stats.recovered,
            deleted = stats.deleted,
            elapsed_s = elapsed.as_secs_f64(),
            "run complete"
        );
    }
}
