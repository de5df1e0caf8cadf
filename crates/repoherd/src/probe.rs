//! Local filesystem state probe.
//!
//! The classification is derived fresh at every evaluation point and never
//! cached: destination state can change mid-run while workers create and
//! delete directories around it.

use std::path::Path;

/// What currently occupies a task's destination path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalRepoState {
    /// Nothing there; the repository needs cloning.
    Absent,
    /// A directory containing a `.git` entry.
    ValidRepository,
    /// A directory that is not a git repository. Never auto-deleted: it may
    /// hold unrelated user data.
    ConflictingDirectory,
}

/// Classify the destination path.
pub fn probe(path: &Path) -> LocalRepoState {
    if !path.exists() {
        return LocalRepoState::Absent;
    }
    if path.is_dir() && path.join(".git").exists() {
        return LocalRepoState::ValidRepository;
    }
    LocalRepoState::ConflictingDirectory
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_all_three_states() {
        let root = tempfile::tempdir().unwrap();

        assert_eq!(probe(&root.path().join("nothing")), LocalRepoState::Absent);

        let repo = root.path().join("repo");
        std::fs::create_dir_all(repo.join(".git")).unwrap();
        assert_eq!(probe(&repo), LocalRepoState::ValidRepository);

        let plain = root.path().join("plain");
        std::fs::create_dir(&plain).unwrap();
        assert_eq!(probe(&plain), LocalRepoState::ConflictingDirectory);
    }

    #[test]
    fn a_file_at_the_destination_is_conflicting() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("occupied");
        std::fs::write(&file, b"not a repo").unwrap();
        assert_eq!(probe(&file), LocalRepoState::ConflictingDirectory);
    }
}
