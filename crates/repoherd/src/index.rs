//! Remote index: the per-run cache of the account's repositories.
//!
//! Built from one bulk listing call so classification never needs a lookup
//! per repository. A cache miss triggers exactly one targeted existence
//! check (the repository may have been renamed or created since the bulk
//! listing) and then gives up; stale-listing misses are data freshness, not
//! transient faults, so they are never retried.

use std::collections::HashMap;

use crate::github::{HostError, RemoteHost};

/// Cached remote identity and size for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIndexEntry {
    pub short_name: String,
    /// Fully-qualified identifier, `owner/name`.
    pub full_name: String,
    pub size_bytes: Option<u64>,
}

/// Short name -> remote entry mapping for one account, built once per run.
#[derive(Debug)]
pub struct RemoteIndex {
    owner: String,
    entries: HashMap<String, RemoteIndexEntry>,
}

impl RemoteIndex {
    /// Issue the bulk listing and populate the index. A failure here is
    /// fatal for the run: no task can be classified without the index.
    pub async fn build(host: &dyn RemoteHost, owner: &str) -> Result<Self, HostError> {
        let repos = host.list_repos(owner).await?;
        let entries = repos
            .into_iter()
            .map(|repo| {
                (
                    repo.name.clone(),
                    RemoteIndexEntry {
                        short_name: repo.name,
                        full_name: repo.full_name,
                        size_bytes: repo.size_bytes,
                    },
                )
            })
            .collect();
        Ok(Self {
            owner: owner.to_string(),
            entries,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a short name to its remote entry. On a cache miss, performs
    /// one existence probe and no more; `None` means the remote account has
    /// no such repository right now.
    pub async fn resolve(
        &self,
        host: &dyn RemoteHost,
        short_name: &str,
    ) -> Option<RemoteIndexEntry> {
        if let Some(entry) = self.entries.get(short_name) {
            return Some(entry.clone());
        }

        match host.repo_exists(&self.owner, short_name).await {
            Ok(true) => Some(RemoteIndexEntry {
                short_name: short_name.to_string(),
                full_name: format!("{}/{}", self.owner, short_name),
                size_bytes: None,
            }),
            Ok(false) => None,
            Err(error) => {
                tracing::warn!(%error, repo = short_name, "existence probe failed; treating as unresolved");
                None
            }
        }
    }

    /// Cached size lookup. Only ever used to pick the clone strategy, so a
    /// miss is simply `None` and the caller defaults to a full clone.
    pub fn size_of(&self, full_name: &str) -> Option<u64> {
        self.entries
            .values()
            .find(|entry| entry.full_name == full_name)
            .and_then(|entry| entry.size_bytes)
    }

    /// Short names present in the index but absent from `known`, sorted.
    /// Feeds the catalog refresh flow.
    pub fn unknown_names(&self, known: &[String]) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .keys()
            .filter(|name| !known.iter().any(|k| k == *name))
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::github::RemoteRepo;

    struct FakeHost {
        repos: Vec<RemoteRepo>,
        extra: Vec<String>,
        probes: AtomicUsize,
    }

    #[async_trait]
    impl RemoteHost for FakeHost {
        async fn list_repos(&self, _owner: &str) -> Result<Vec<RemoteRepo>, HostError> {
            Ok(self.repos.clone())
        }

        async fn repo_exists(&self, _owner: &str, name: &str) -> Result<bool, HostError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(self.extra.iter().any(|n| n == name))
        }

        async fn repo_size(&self, _owner: &str, _name: &str) -> Result<Option<u64>, HostError> {
            Ok(None)
        }
    }

    fn host() -> FakeHost {
        FakeHost {
            repos: vec![RemoteRepo::new("svcA", "acme/svcA", Some(2048))],
            extra: vec!["renamed".to_string()],
            probes: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn resolve_hits_the_cache_without_probing() {
        let host = host();
        let index = RemoteIndex::build(&host, "acme").await.unwrap();
        let entry = index.resolve(&host, "svcA").await.unwrap();
        assert_eq!(entry.full_name, "acme/svcA");
        assert_eq!(entry.size_bytes, Some(2048));
        assert_eq!(host.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn miss_probes_exactly_once() {
        let host = host();
        let index = RemoteIndex::build(&host, "acme").await.unwrap();

        let entry = index.resolve(&host, "renamed").await.unwrap();
        assert_eq!(entry.full_name, "acme/renamed");
        assert_eq!(entry.size_bytes, None);
        assert_eq!(host.probes.load(Ordering::SeqCst), 1);

        assert!(index.resolve(&host, "gone").await.is_none());
        assert_eq!(host.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_names_feed_the_refresh_flow() {
        let host = host();
        let index = RemoteIndex::build(&host, "acme").await.unwrap();
        assert_eq!(index.unknown_names(&["svcA".to_string()]), Vec::<String>::new());
        assert_eq!(index.unknown_names(&[]), vec!["svcA".to_string()]);
    }
}
