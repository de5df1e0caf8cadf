//! Diff analyzer: classify every group member into a task list.
//!
//! Combines the group catalog, the remote index and the local state probe.
//! Only the `ToClone` subset becomes scheduler work; the other
//! classifications are recorded directly in the run statistics.

use std::path::Path;

use crate::catalog::RepoGroup;
use crate::github::RemoteHost;
use crate::index::RemoteIndex;
use crate::probe::{self, LocalRepoState};
use crate::types::{RepoTask, SizePolicy};

/// Classified plan for one group.
#[derive(Debug, Clone)]
pub struct GroupDiff {
    pub group: String,
    /// Members needing a clone, in catalog order.
    pub tasks: Vec<RepoTask>,
    /// Members already present as valid repositories.
    pub present: Vec<String>,
    /// Members whose destination is occupied by a non-repository directory.
    pub conflicting: Vec<String>,
    /// Members with no resolvable remote identity; immediate failures that
    /// still belong in the failed-task artifact for later replay.
    pub missing: Vec<RepoTask>,
    /// Members above the huge-size threshold (reported, still shallow).
    pub huge: usize,
}

/// Classify every member of `group` against the remote index and the local
/// filesystem under the group's folder.
pub async fn analyze_group(
    index: &RemoteIndex,
    host: &dyn RemoteHost,
    group: &RepoGroup,
    root: &Path,
    policy: &SizePolicy,
) -> GroupDiff {
    let folder = group.folder(root);
    let mut diff = GroupDiff {
        group: group.name.clone(),
        tasks: Vec::new(),
        present: Vec::new(),
        conflicting: Vec::new(),
        missing: Vec::new(),
        huge: 0,
    };

    for (seq, member) in group.members.iter().enumerate() {
        let dest = folder.join(member);

        let Some(entry) = index.resolve(host, member).await else {
            tracing::warn!(group = %group.name, repo = %member, "no remote repository; recording as failed");
            diff.missing.push(RepoTask {
                full_name: format!("{}/{}", index.owner(), member),
                short_name: member.clone(),
                dest,
                group: group.name.clone(),
                seq,
                mode: crate::types::CloneMode::Full,
            });
            continue;
        };

        match probe::probe(&dest) {
            LocalRepoState::ValidRepository => diff.present.push(member.clone()),
            LocalRepoState::ConflictingDirectory => {
                tracing::warn!(
                    path = %dest.display(),
                    "destination exists but is not a git repository; skipping"
                );
                diff.conflicting.push(member.clone());
            }
            LocalRepoState::Absent => {
                let (mode, huge) = policy.decide(entry.size_bytes);
                if huge {
                    diff.huge += 1;
                }
                diff.tasks.push(RepoTask {
                    full_name: entry.full_name,
                    short_name: member.clone(),
                    dest,
                    group: group.name.clone(),
                    seq,
                    mode,
                });
            }
        }
    }

    diff
}
