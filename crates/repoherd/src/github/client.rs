//! GitHub client backed by octocrab.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use octocrab::Octocrab;

use super::error::{is_not_found, map_api_error, HostError};
use super::types::RemoteRepo;
use super::RemoteHost;

/// Page size for the bulk listing. One bulk walk replaces per-repository
/// lookups entirely.
const PER_PAGE: u8 = 100;

/// Retry attempts for transient API failures (rate limits).
const API_RETRIES: usize = 3;

/// GitHub-backed [`RemoteHost`]. Works unauthenticated for public accounts;
/// a personal access token raises rate limits and reaches private repos.
pub struct GitHubHost {
    client: Octocrab,
}

impl GitHubHost {
    /// Create a client, authenticated when a token is provided.
    pub fn new(token: Option<&str>) -> Result<Self, HostError> {
        let client = match token {
            Some(token) => Octocrab::builder()
                .personal_token(token.to_string())
                .build()?,
            None => Octocrab::builder().build()?,
        };
        Ok(Self { client })
    }

    fn backoff() -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_max_times(API_RETRIES)
            .with_jitter()
    }

    async fn fetch_page(&self, owner: &str, page: u32) -> Result<Vec<RemoteRepo>, HostError> {
        let result = self
            .client
            .users(owner)
            .repos()
            .per_page(PER_PAGE)
            .page(page)
            .send()
            .await
            .map_err(|e| map_api_error(e, owner))?;

        Ok(result
            .items
            .into_iter()
            .map(|repo| {
                let full_name = repo
                    .full_name
                    .clone()
                    .unwrap_or_else(|| format!("{owner}/{}", repo.name));
                // GitHub reports sizes in kilobytes.
                let size_bytes = repo.size.map(|kb| u64::from(kb) * 1024);
                RemoteRepo::new(repo.name, full_name, size_bytes)
            })
            .collect())
    }
}

#[async_trait]
impl RemoteHost for GitHubHost {
    async fn list_repos(&self, owner: &str) -> Result<Vec<RemoteRepo>, HostError> {
        let mut repos = Vec::new();
        let mut page = 1u32;
        loop {
            let fetch = || self.fetch_page(owner, page);
            let batch = fetch
                .retry(Self::backoff())
                .when(HostError::is_transient)
                .await?;

            let last_page = batch.len() < usize::from(PER_PAGE);
            repos.extend(batch);
            if last_page {
                break;
            }
            page += 1;
        }
        tracing::debug!(owner, total = repos.len(), "fetched account listing");
        Ok(repos)
    }

    async fn repo_exists(&self, owner: &str, name: &str) -> Result<bool, HostError> {
        match self.client.repos(owner, name).get().await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(map_api_error(e, &format!("{owner}/{name}"))),
        }
    }

    async fn repo_size(&self, owner: &str, name: &str) -> Result<Option<u64>, HostError> {
        let repo = self
            .client
            .repos(owner, name)
            .get()
            .await
            .map_err(|e| map_api_error(e, &format!("{owner}/{name}")))?;
        Ok(repo.size.map(|kb| u64::from(kb) * 1024))
    }
}
