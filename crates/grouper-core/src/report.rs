//! The published access map (`ghmap.json`).
//!
//! ```json
//! {"repos": {"foo": ["alice-gh"]}, "map": {"alice": "alice-gh"}}
//! ```

use crate::error::Result;
use crate::io::atomic_write;
use crate::links::LinkStore;
use crate::reconcile::RunReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessMap {
    /// Desired writers per converged project.
    pub repos: BTreeMap<String, Vec<String>>,
    /// Every linked ASF id → GitHub login.
    pub map: BTreeMap<String, String>,
}

impl AccessMap {
    pub fn build(report: &RunReport, links: &LinkStore) -> Self {
        Self {
            repos: report.writers(),
            map: links.linked_map(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec(self)?;
        atomic_write(path, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::AccountLink;
    use crate::reconcile::{ProjectOutcome, SkipReason};
    use chrono::Utc;
    use tempfile::TempDir;

    fn outcome(project: &str, desired: &[&str], skipped: Option<SkipReason>) -> ProjectOutcome {
        ProjectOutcome {
            project: project.to_string(),
            team: Some(format!("{project}-committers")),
            skipped,
            desired: desired.iter().map(|d| d.to_string()).collect(),
            planned: vec![],
            failed: vec![],
            exempt: vec![],
            exclusions: vec![],
        }
    }

    #[test]
    fn build_includes_only_converged_projects() {
        let report = RunReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            dry_run: false,
            outcomes: vec![
                outcome("foo", &["alice-gh"], None),
                outcome("bar", &[], Some(SkipReason::NoAuthoritativeMembers)),
            ],
        };
        let links = LinkStore::from_links([
            AccountLink {
                asf_id: "Alice".into(),
                github_id: Some("alice-gh".into()),
                mfa_flag: true,
            },
            AccountLink {
                asf_id: "dave".into(),
                github_id: None,
                mfa_flag: false,
            },
        ]);

        let map = AccessMap::build(&report, &links);
        assert_eq!(map.repos.len(), 1);
        assert_eq!(map.repos["foo"], ["alice-gh"]);
        assert_eq!(map.map.len(), 1);
        assert_eq!(map.map["alice"], "alice-gh");
    }

    #[test]
    fn save_writes_expected_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("site/ghmap.json");
        let mut map = AccessMap::default();
        map.repos.insert("foo".into(), vec!["alice-gh".into()]);
        map.map.insert("alice".into(), "alice-gh".into());
        map.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({
                "repos": {"foo": ["alice-gh"]},
                "map": {"alice": "alice-gh"}
            })
        );
        assert_eq!(AccessMap::load(&path).unwrap(), map);
    }
}
