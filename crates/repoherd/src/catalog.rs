//! Group catalog: the plain-text document mapping groups to repositories.
//!
//! The grammar is line based. An `Owner:` line names the account owner, each
//! `## <group>` header opens a group (with an optional `<!-- tag -->`
//! decoration used only to compose the folder name), and each `- <repo>`
//! bullet adds one member. Anything else is prose and is ignored. The same
//! grammar is used for the failed-task artifact, so an artifact from one run
//! feeds straight back in as the task list of the next (the replay loop).

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

use crate::types::RepoTask;

/// Group that collects repositories not yet assigned by the user; the
/// `refresh` flow appends newly discovered remote repositories here.
pub const UNASSIGNED_GROUP: &str = "Unassigned";

/// Errors raised while loading or interpreting the group file. All of these
/// are fatal: no task can be classified without a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("group file not found: {0}")]
    Missing(PathBuf),

    #[error("failed to read group file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("group file names no account owner (add an `Owner:` line or pass --owner)")]
    NoOwner,

    #[error("group file defines no groups")]
    Empty,

    #[error("unknown group: {0}")]
    UnknownGroup(String),
}

/// A named, user-defined collection of repositories sharing a local folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoGroup {
    pub name: String,
    /// Optional decorative label, used only to compose the folder name.
    pub tag: Option<String>,
    /// Ordered repository short names.
    pub members: Vec<String>,
}

impl RepoGroup {
    /// Folder name for this group: `"name (tag)"` or just `"name"`.
    /// Deterministic, so re-running with unchanged configuration always
    /// computes identical destination paths.
    pub fn folder_name(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{} ({})", self.name, tag),
            None => self.name.clone(),
        }
    }

    /// Full path of the group folder under the repository root.
    pub fn folder(&self, root: &Path) -> PathBuf {
        root.join(self.folder_name())
    }
}

/// In-memory catalog built once from the group file, immutable for the run.
#[derive(Debug, Clone)]
pub struct GroupCatalog {
    pub owner: String,
    pub groups: Vec<RepoGroup>,
}

impl GroupCatalog {
    /// Load and parse the group file. A missing file is a fatal error.
    pub fn load(path: &Path, owner_override: Option<&str>) -> Result<Self, CatalogError> {
        if !path.is_file() {
            return Err(CatalogError::Missing(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, owner_override)
    }

    /// Parse group-file content.
    pub fn parse(content: &str, owner_override: Option<&str>) -> Result<Self, CatalogError> {
        let mut owner = owner_override
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_owned);
        let mut groups: Vec<RepoGroup> = Vec::new();

        for line in content.lines() {
            if owner.is_none() {
                if let Some(found) = parse_owner_line(line) {
                    owner = Some(found);
                    continue;
                }
            }
            if let Some((name, tag)) = parse_group_header(line) {
                groups.push(RepoGroup {
                    name,
                    tag,
                    members: Vec::new(),
                });
                continue;
            }
            if let Some(member) = parse_member_line(line) {
                // Bullets before the first group header are prose, not members.
                if let Some(group) = groups.last_mut() {
                    group.members.push(member);
                }
            }
        }

        let owner = owner.ok_or(CatalogError::NoOwner)?;
        if groups.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { owner, groups })
    }

    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Option<&RepoGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Select the requested groups, or all groups when the selection is
    /// empty. Naming a group the catalog does not define is an error.
    pub fn select(&self, names: &[String]) -> Result<Vec<&RepoGroup>, CatalogError> {
        if names.is_empty() {
            return Ok(self.groups.iter().collect());
        }
        names
            .iter()
            .map(|name| {
                self.group(name)
                    .ok_or_else(|| CatalogError::UnknownGroup(name.clone()))
            })
            .collect()
    }

    /// All group folders the catalog knows about, whether or not they were
    /// requested this run. The reconciler scans exactly these.
    pub fn group_folders(&self, root: &Path) -> Vec<PathBuf> {
        self.groups.iter().map(|g| g.folder(root)).collect()
    }

    /// Render the catalog back into the group-file grammar.
    pub fn render(&self) -> String {
        render_groups("Repository groups", &self.owner, &self.groups)
    }
}

/// Render groups into the group-file grammar. The title becomes a `#`
/// heading, which the parser treats as prose.
pub fn render_groups(title: &str, owner: &str, groups: &[RepoGroup]) -> String {
    let mut lines = vec![
        format!("# {title}"),
        String::new(),
        format!("Owner: {owner}"),
        String::new(),
    ];
    for group in groups {
        match &group.tag {
            Some(tag) => lines.push(format!("## {} <!-- {} -->", group.name, tag)),
            None => lines.push(format!("## {}", group.name)),
        }
        for member in &group.members {
            lines.push(format!("- {member}"));
        }
        lines.push(String::new());
    }
    let mut text = lines.join("\n");
    while text.ends_with("\n\n") {
        text.pop();
    }
    text
}

/// Write the failed-task artifact: the tasks left in terminal failed state,
/// grouped the same way the group file is, suitable for direct reuse as an
/// alternate task list on a subsequent run.
///
/// When nothing failed the artifact file is removed instead, so a stale list
/// from an earlier run cannot be replayed by mistake.
pub fn write_failed_artifact(
    path: &Path,
    catalog: &GroupCatalog,
    failed: &[RepoTask],
) -> io::Result<usize> {
    if failed.is_empty() {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        return Ok(0);
    }

    let mut by_group: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for task in failed {
        by_group
            .entry(task.group.as_str())
            .or_default()
            .push(task.short_name.as_str());
    }

    let groups: Vec<RepoGroup> = by_group
        .into_iter()
        .map(|(name, members)| RepoGroup {
            name: name.to_string(),
            tag: catalog.group(name).and_then(|g| g.tag.clone()),
            members: members.into_iter().map(str::to_owned).collect(),
        })
        .collect();

    let title = format!(
        "Failed tasks (generated {})",
        Utc::now().format("%Y-%m-%d %H:%M UTC")
    );
    fs::write(path, render_groups(&title, &catalog.owner, &groups))?;
    Ok(failed.len())
}

/// Insert remote repositories unknown to the document into the
/// [`UNASSIGNED_GROUP`] section, creating the section at the end when it does
/// not exist. The rest of the document is preserved as-is. Returns the
/// updated text and the number of repositories inserted.
pub fn merge_unassigned(content: &str, new_repos: &[String]) -> (String, usize) {
    if new_repos.is_empty() {
        return (content.to_string(), 0);
    }

    let mut lines: Vec<String> = content.lines().map(str::to_owned).collect();

    // Locate the unassigned section: from its header to the next header.
    let headers: Vec<(usize, String)> = lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| parse_group_header(line).map(|(name, _)| (i, name)))
        .collect();

    let section = headers
        .iter()
        .position(|(_, name)| name == UNASSIGNED_GROUP)
        .map(|i| {
            let start = headers[i].0;
            let end = headers
                .get(i + 1)
                .map(|(next, _)| *next)
                .unwrap_or(lines.len());
            (start, end)
        });

    let Some((start, end)) = section else {
        if lines.last().is_some_and(|l| !l.trim().is_empty()) {
            lines.push(String::new());
        }
        lines.push(format!("## {UNASSIGNED_GROUP}"));
        for repo in new_repos {
            lines.push(format!("- {repo}"));
        }
        return (lines.join("\n"), new_repos.len());
    };

    let existing: Vec<String> = lines[start + 1..end]
        .iter()
        .filter_map(|l| parse_member_line(l))
        .collect();
    let to_add: Vec<&String> = new_repos
        .iter()
        .filter(|r| !existing.iter().any(|e| e == *r))
        .collect();
    if to_add.is_empty() {
        return (content.to_string(), 0);
    }

    // Insert before the section's trailing blank lines.
    let mut insert_at = end;
    while insert_at > start + 1 && lines[insert_at - 1].trim().is_empty() {
        insert_at -= 1;
    }
    for (offset, repo) in to_add.iter().enumerate() {
        lines.insert(insert_at + offset, format!("- {repo}"));
    }
    let added = to_add.len();
    (lines.join("\n"), added)
}

fn parse_owner_line(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix("Owner:")?;
    let owner = rest.trim();
    (!owner.is_empty()).then(|| owner.to_string())
}

fn parse_group_header(line: &str) -> Option<(String, Option<String>)> {
    let rest = line.strip_prefix("## ")?.trim();
    if rest.is_empty() {
        return None;
    }
    if let Some(open) = rest.find("<!--") {
        let name = rest[..open].trim();
        let tag = rest[open + 4..]
            .strip_suffix("-->")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned);
        (!name.is_empty()).then(|| (name.to_string(), tag))
    } else {
        Some((rest.to_string(), None))
    }
}

fn parse_member_line(line: &str) -> Option<String> {
    let rest = line.trim_start().strip_prefix("- ")?;
    let name = rest.split_whitespace().next()?;
    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Repository groups

Owner: acme

## Backend <!-- hl-7 -->
- svcA
- svcB

## Tools
- cli
";

    #[test]
    fn parses_owner_groups_tags_and_members() {
        let catalog = GroupCatalog::parse(SAMPLE, None).unwrap();
        assert_eq!(catalog.owner, "acme");
        assert_eq!(catalog.groups.len(), 2);

        let backend = &catalog.groups[0];
        assert_eq!(backend.name, "Backend");
        assert_eq!(backend.tag.as_deref(), Some("hl-7"));
        assert_eq!(backend.members, vec!["svcA", "svcB"]);

        let tools = &catalog.groups[1];
        assert_eq!(tools.tag, None);
        assert_eq!(tools.members, vec!["cli"]);
    }

    #[test]
    fn owner_override_wins_over_the_document() {
        let catalog = GroupCatalog::parse(SAMPLE, Some("other")).unwrap();
        assert_eq!(catalog.owner, "other");
    }

    #[test]
    fn missing_owner_is_fatal() {
        let err = GroupCatalog::parse("## G\n- r\n", None).unwrap_err();
        assert!(matches!(err, CatalogError::NoOwner));
    }

    #[test]
    fn no_groups_is_fatal() {
        let err = GroupCatalog::parse("Owner: acme\n", None).unwrap_err();
        assert!(matches!(err, CatalogError::Empty));
    }

    #[test]
    fn folder_name_is_deterministic() {
        let catalog = GroupCatalog::parse(SAMPLE, None).unwrap();
        assert_eq!(catalog.groups[0].folder_name(), "Backend (hl-7)");
        assert_eq!(catalog.groups[1].folder_name(), "Tools");
    }

    #[test]
    fn select_unknown_group_errors() {
        let catalog = GroupCatalog::parse(SAMPLE, None).unwrap();
        let err = catalog.select(&["Nope".to_string()]).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownGroup(name) if name == "Nope"));
    }

    #[test]
    fn render_round_trips_through_the_parser() {
        let catalog = GroupCatalog::parse(SAMPLE, None).unwrap();
        let rendered = catalog.render();
        let reparsed = GroupCatalog::parse(&rendered, None).unwrap();
        assert_eq!(reparsed.owner, catalog.owner);
        assert_eq!(reparsed.groups, catalog.groups);
    }

    #[test]
    fn merge_appends_into_existing_unassigned_section() {
        let content = "Owner: acme\n\n## Unassigned\n- old\n\n## Tools\n- cli\n";
        let (updated, added) =
            merge_unassigned(content, &["newer".to_string(), "old".to_string()]);
        assert_eq!(added, 1, "already-listed repos are not reinserted");
        let catalog = GroupCatalog::parse(&updated, None).unwrap();
        assert_eq!(
            catalog.group(UNASSIGNED_GROUP).unwrap().members,
            vec!["old", "newer"]
        );
        // Other sections untouched.
        assert_eq!(catalog.group("Tools").unwrap().members, vec!["cli"]);
    }

    #[test]
    fn merge_creates_the_section_when_absent() {
        let content = "Owner: acme\n\n## Tools\n- cli\n";
        let (updated, added) = merge_unassigned(content, &["fresh".to_string()]);
        assert_eq!(added, 1);
        let catalog = GroupCatalog::parse(&updated, None).unwrap();
        assert_eq!(catalog.group(UNASSIGNED_GROUP).unwrap().members, vec!["fresh"]);
    }

    #[test]
    fn merge_with_nothing_new_is_a_no_op() {
        let content = "Owner: acme\n\n## Tools\n- cli\n";
        let (updated, added) = merge_unassigned(content, &[]);
        assert_eq!(added, 0);
        assert_eq!(updated, content);
    }
}
