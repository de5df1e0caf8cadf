//! Configuration file support.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `REPOHERD_`, e.g. `REPOHERD_GITHUB_TOKEN`)
//! 3. Config file (~/.config/repoherd/config.toml or ./repoherd.toml)
//! 4. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [github]
//! token = "ghp_..."  # or use REPOHERD_GITHUB_TOKEN env var
//!
//! [sync]
//! root = "/home/me/Repos"
//! file = "/home/me/Repos/REPO-GROUPS.md"  # optional, defaults to <root>/REPO-GROUPS.md
//! tasks = 5
//! connections = 8
//! ```

use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use repoherd::types::{DEFAULT_TASK_PARALLELISM, DEFAULT_TRANSFER_PARALLELISM};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GitHub configuration.
    pub github: GitHubConfig,
    /// Default sync options.
    pub sync: SyncConfig,
}

/// GitHub configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Personal access token. Optional: public accounts work without one,
    /// at a lower rate limit. Can also be set via REPOHERD_GITHUB_TOKEN.
    pub token: Option<String>,
}

/// Default sync options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Root directory the group folders live under.
    pub root: Option<PathBuf>,
    /// Group file path; defaults to `REPO-GROUPS.md` under the root.
    pub file: Option<PathBuf>,
    /// Repositories synced at once.
    pub tasks: usize,
    /// `git clone --jobs` transfer parallelism per repository.
    pub connections: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: None,
            file: None,
            tasks: DEFAULT_TASK_PARALLELISM,
            connections: DEFAULT_TRANSFER_PARALLELISM,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/repoherd/config.toml)
    /// 3. Local config file (./repoherd.toml)
    /// 4. Environment variables with REPOHERD_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "repoherd") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        let local_config = PathBuf::from("repoherd.toml");
        if local_config.exists() {
            tracing::debug!("loading config from ./repoherd.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("REPOHERD")
                .separator("_")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("failed to build config: {}", e);
                Config::default()
            }
        }
    }

    pub fn github_token(&self) -> Option<String> {
        self.github.token.clone()
    }

    /// Root directory, falling back to the current directory.
    pub fn root(&self) -> PathBuf {
        self.sync.root.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Group file path for a given root.
    pub fn group_file(&self, root: &std::path::Path) -> PathBuf {
        self.sync
            .file
            .clone()
            .unwrap_or_else(|| root.join("REPO-GROUPS.md"))
    }
}
