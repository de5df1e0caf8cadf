//! Remote repository metadata as the engine sees it.

/// One repository from the account listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepo {
    /// Repository short name.
    pub name: String,
    /// Fully-qualified identifier, `owner/name`.
    pub full_name: String,
    /// Reported size in bytes. GitHub reports kilobytes; the client converts.
    /// Absent size data never blocks a clone.
    pub size_bytes: Option<u64>,
}

impl RemoteRepo {
    pub fn new(
        name: impl Into<String>,
        full_name: impl Into<String>,
        size_bytes: Option<u64>,
    ) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            size_bytes,
        }
    }
}
