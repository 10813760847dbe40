//! Project naming and discovery.
//!
//! A project is derived from a repository name: strip `incubator-`, then
//! keep everything up to the first `-` (or `.` for on-disk `*.git` dirs).
//! `empire-db` is the one project whose name itself contains a dash.

use crate::error::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

/// Never a project: the org-wide umbrella team is `apache-committers`.
pub const UMBRELLA: &str = "apache";

const PODLING_PREFIX: &str = "incubator-";
const TEAM_SUFFIX: &str = "-committers";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectKind {
    Tlp,
    Podling,
}

impl std::fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectKind::Tlp => write!(f, "tlp"),
            ProjectKind::Podling => write!(f, "podling"),
        }
    }
}

static REPO_DIR_RE: OnceLock<Regex> = OnceLock::new();
static REPO_PREFIX_RE: OnceLock<Regex> = OnceLock::new();

fn repo_dir_re() -> &'static Regex {
    REPO_DIR_RE
        .get_or_init(|| Regex::new(r"^(?:incubator-)?(empire-db|[^-.]+).*\.git$").unwrap())
}

fn repo_prefix_re() -> &'static Regex {
    REPO_PREFIX_RE.get_or_init(|| Regex::new(r"^(?:incubator-)?(empire-db|[^-]+)").unwrap())
}

/// Map an on-disk repository directory name (`foo-site.git`) to its project.
pub fn project_from_repo_dir(name: &str) -> Option<(String, ProjectKind)> {
    let caps = repo_dir_re().captures(name)?;
    let project = caps.get(1)?.as_str();
    if project == UMBRELLA {
        return None;
    }
    let kind = if name.starts_with(PODLING_PREFIX) {
        ProjectKind::Podling
    } else {
        ProjectKind::Tlp
    };
    Some((project.to_string(), kind))
}

/// The project prefix of a GitHub repository name (`incubator-bar-extras` → `bar`).
pub fn project_prefix(repo: &str) -> Option<&str> {
    repo_prefix_re()
        .captures(repo)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Slug of the committer team for `project`.
pub fn team_slug(project: &str) -> String {
    format!("{project}{TEAM_SUFFIX}")
}

/// Display name used when creating the committer team.
pub fn team_name(project: &str) -> String {
    format!("{project} committers")
}

/// Inverse of [`team_slug`]. The umbrella team yields `None`.
pub fn project_for_team_slug(slug: &str) -> Option<&str> {
    let project = slug.strip_suffix(TEAM_SUFFIX)?;
    if project.is_empty() || project == UMBRELLA {
        return None;
    }
    Some(project)
}

/// Scan `git_dirs` for repository directories and derive the project set.
///
/// The first repository seen for a project decides its kind.
pub fn discover_projects<P: AsRef<Path>>(git_dirs: &[P]) -> Result<BTreeMap<String, ProjectKind>> {
    let mut projects = BTreeMap::new();
    for dir in git_dirs {
        for name in repo_dir_names(dir.as_ref())? {
            if let Some((project, kind)) = project_from_repo_dir(&name) {
                projects.entry(project).or_insert(kind);
            }
        }
    }
    Ok(projects)
}

/// Names of `*.git` repositories in `dir`, without the suffix.
pub fn local_repos(dir: &Path) -> Result<BTreeSet<String>> {
    Ok(repo_dir_names(dir)?
        .into_iter()
        .filter_map(|name| name.strip_suffix(".git").map(str::to_string))
        .collect())
}

fn repo_dir_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn repo_dir_names_map_to_projects() {
        assert_eq!(
            project_from_repo_dir("httpd.git"),
            Some(("httpd".to_string(), ProjectKind::Tlp))
        );
        assert_eq!(
            project_from_repo_dir("httpd-site.git"),
            Some(("httpd".to_string(), ProjectKind::Tlp))
        );
        assert_eq!(
            project_from_repo_dir("incubator-bar.git"),
            Some(("bar".to_string(), ProjectKind::Podling))
        );
        assert_eq!(
            project_from_repo_dir("empire-db-site.git"),
            Some(("empire-db".to_string(), ProjectKind::Tlp))
        );
    }

    #[test]
    fn umbrella_and_non_git_dirs_are_rejected() {
        assert_eq!(project_from_repo_dir("apache-site.git"), None);
        assert_eq!(project_from_repo_dir("scratch"), None);
    }

    #[test]
    fn prefix_of_github_repo() {
        assert_eq!(project_prefix("bar"), Some("bar"));
        assert_eq!(project_prefix("bar-extras"), Some("bar"));
        assert_eq!(project_prefix("incubator-bar-site"), Some("bar"));
        assert_eq!(project_prefix("empire-db-examples"), Some("empire-db"));
        assert_eq!(project_prefix("barista"), Some("barista"));
    }

    #[test]
    fn team_slug_round_trip() {
        assert_eq!(team_slug("foo"), "foo-committers");
        assert_eq!(team_name("foo"), "foo committers");
        assert_eq!(project_for_team_slug("foo-committers"), Some("foo"));
        assert_eq!(project_for_team_slug("apache-committers"), None);
        assert_eq!(project_for_team_slug("foo-pmc"), None);
        assert_eq!(project_for_team_slug("-committers"), None);
    }

    #[test]
    fn discover_scans_dirs_in_order() {
        let asf = TempDir::new().unwrap();
        let private = TempDir::new().unwrap();
        for name in ["foo.git", "foo-site.git", "incubator-bar.git", "apache-infra.git"] {
            std::fs::create_dir(asf.path().join(name)).unwrap();
        }
        std::fs::write(asf.path().join("stray.git"), b"not a dir").unwrap();
        std::fs::create_dir(private.path().join("bar-private.git")).unwrap();
        std::fs::create_dir(private.path().join("secret.git")).unwrap();

        let projects = discover_projects(&[asf.path(), private.path()]).unwrap();
        let names: Vec<_> = projects.keys().cloned().collect();
        assert_eq!(names, ["bar", "foo", "secret"]);
        assert_eq!(projects["bar"], ProjectKind::Podling);
        assert_eq!(projects["foo"], ProjectKind::Tlp);
    }

    #[test]
    fn discover_fails_on_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(discover_projects(&[dir.path().join("nope")]).is_err());
    }

    #[test]
    fn local_repos_strips_suffix() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("bar-extras.git")).unwrap();
        std::fs::create_dir(dir.path().join("notes")).unwrap();
        let repos = local_repos(dir.path()).unwrap();
        assert_eq!(repos.into_iter().collect::<Vec<_>>(), ["bar-extras"]);
    }
}
