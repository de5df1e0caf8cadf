//! GitHub API error taxonomy.

use thiserror::Error;

/// Errors from the remote hosting service.
///
/// `NotFound` is a data-freshness condition (the repository was renamed or
/// deleted since the bulk listing), not a transient fault, and is never
/// retried. `RateLimited` is the only variant the API retry wrapper backs
/// off on.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("account or repository not found: {0}")]
    NotFound(String),

    #[error("GitHub API rate limit exceeded")]
    RateLimited,

    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),
}

impl HostError {
    /// Whether backing off and re-issuing the call can help.
    pub fn is_transient(&self) -> bool {
        matches!(self, HostError::RateLimited)
    }
}

/// Map an octocrab error onto the engine taxonomy, tagging `context` (an
/// `owner` or `owner/name`) for not-found reporting.
pub fn map_api_error(error: octocrab::Error, context: &str) -> HostError {
    if let octocrab::Error::GitHub { ref source, .. } = error {
        match source.status_code.as_u16() {
            404 => return HostError::NotFound(context.to_string()),
            403 | 429 => return HostError::RateLimited,
            _ => {}
        }
    }
    HostError::Api(error)
}

/// Whether an octocrab error is a 404 for the probed repository.
pub fn is_not_found(error: &octocrab::Error) -> bool {
    matches!(
        error,
        octocrab::Error::GitHub { source, .. } if source.status_code.as_u16() == 404
    )
}
