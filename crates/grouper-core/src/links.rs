//! Read-only view of the ASF ↔ GitHub account link table.
//!
//! The table is filled by the self-service linking flow; grouper only reads
//! it, once per run:
//! ```text
//! CREATE TABLE ids (asfid TEXT, githubid TEXT, mfa INTEGER)
//! ```

use crate::error::Result;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountLink {
    pub asf_id: String,
    pub github_id: Option<String>,
    /// MFA flag recorded at link time. Informational; the MFA feed decides.
    pub mfa_flag: bool,
}

impl AccountLink {
    pub fn is_linked(&self) -> bool {
        self.github_id.is_some()
    }
}

#[derive(Debug, Default)]
pub struct LinkStore {
    by_asf: HashMap<String, AccountLink>,
}

impl LinkStore {
    /// Load every row from the SQLite database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Self::load(&conn)
    }

    pub fn load(conn: &Connection) -> Result<Self> {
        let mut stmt = conn.prepare("SELECT asfid, githubid, mfa FROM ids")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<i64>>(2)?,
            ))
        })?;

        let mut links = Vec::new();
        for row in rows {
            let (asf_id, github_id, mfa) = row?;
            let Some(asf_id) = asf_id.filter(|s| !s.trim().is_empty()) else {
                continue;
            };
            links.push(AccountLink {
                asf_id,
                github_id,
                mfa_flag: mfa.unwrap_or(0) != 0,
            });
        }
        Ok(Self::from_links(links))
    }

    /// Build from already-loaded links. Later entries for the same ASF id win.
    pub fn from_links(links: impl IntoIterator<Item = AccountLink>) -> Self {
        let mut by_asf = HashMap::new();
        for mut link in links {
            link.asf_id = link.asf_id.trim().to_lowercase();
            link.github_id = link
                .github_id
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty());
            by_asf.insert(link.asf_id.clone(), link);
        }
        Self { by_asf }
    }

    pub fn len(&self) -> usize {
        self.by_asf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_asf.is_empty()
    }

    pub fn link_for(&self, asf_id: &str) -> Option<&AccountLink> {
        self.by_asf.get(&asf_id.to_lowercase())
    }

    /// GitHub login linked to `asf_id`, if any. Case-insensitive on the ASF id.
    pub fn github_for(&self, asf_id: &str) -> Option<&str> {
        self.link_for(asf_id).and_then(|l| l.github_id.as_deref())
    }

    /// Every linked account, keyed by lowercase ASF id.
    pub fn linked_map(&self) -> BTreeMap<String, String> {
        self.by_asf
            .values()
            .filter_map(|l| {
                l.github_id
                    .as_ref()
                    .map(|g| (l.asf_id.clone(), g.clone()))
            })
            .collect()
    }
}
