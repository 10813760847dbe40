//! Project committer lists from the group directory.
//!
//! Lookup order for a group:
//! 1. a static `members` list from the config, used verbatim
//! 2. otherwise an LDAP base-scope search, at the override `ldap` base or the
//!    default `group_base`, reading the override `ldapkey` or `member_attr`
//!
//! Member values are DNs like `uid=alice,ou=people,dc=apache,dc=org`;
//! anything that does not parse as a person DN is ignored.

use crate::config::{GroupOverride, LdapConfig};
use crate::error::{GrouperError, Result};
use ldap3::{LdapConn, LdapConnSettings, Scope, SearchEntry};
use regex::Regex;
use std::collections::BTreeMap;
use std::time::Duration;

/// Something that can answer "who is in group X".
pub trait GroupDirectory {
    /// Lowercase account ids in `group`. An empty list means the directory
    /// had nothing; callers must not read it as "the group is empty".
    fn members(&self, group: &str) -> Result<Vec<String>>;
}

/// Raw attribute access; the LDAP connection lives behind this.
pub trait DirectoryBackend {
    fn search(&self, base: &str, attribute: &str) -> Result<Vec<String>>;
}

// ---------------------------------------------------------------------------
// LdapBackend
// ---------------------------------------------------------------------------

/// Binds fresh for every search, matching a short-lived batch job.
pub struct LdapBackend {
    uri: String,
    bind_dn: String,
    password: String,
    timeout: Duration,
}

impl LdapBackend {
    pub fn new(config: &LdapConfig) -> Self {
        Self {
            uri: config.uri.clone(),
            bind_dn: config.bind_dn.clone(),
            password: config.password.clone().unwrap_or_default(),
            timeout: config.timeout(),
        }
    }
}

impl DirectoryBackend for LdapBackend {
    fn search(&self, base: &str, attribute: &str) -> Result<Vec<String>> {
        let fail = |e: ldap3::LdapError| GrouperError::Directory {
            group: base.to_string(),
            reason: e.to_string(),
        };

        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        let mut conn = LdapConn::with_settings(settings, &self.uri).map_err(fail)?;
        conn.with_timeout(self.timeout)
            .simple_bind(&self.bind_dn, &self.password)
            .and_then(|r| r.success())
            .map_err(fail)?;
        let (entries, _) = conn
            .with_timeout(self.timeout)
            .search(base, Scope::Base, "(objectClass=*)", vec![attribute])
            .and_then(|r| r.success())
            .map_err(fail)?;

        let mut values = Vec::new();
        for entry in entries {
            let entry = SearchEntry::construct(entry);
            for (name, vals) in entry.attrs {
                if name.eq_ignore_ascii_case(attribute) {
                    values.extend(vals);
                }
            }
        }
        if let Err(e) = conn.unbind() {
            tracing::debug!("LDAP unbind failed: {e}");
        }
        Ok(values)
    }
}

// ---------------------------------------------------------------------------
// GroupResolver
// ---------------------------------------------------------------------------

pub struct GroupResolver {
    backend: Option<Box<dyn DirectoryBackend>>,
    overrides: BTreeMap<String, GroupOverride>,
    group_base: String,
    member_attr: String,
    uid_re: Regex,
}

impl GroupResolver {
    /// `ldap` supplies the defaults for base, attribute and people DN; with
    /// no `backend` only static member lists resolve.
    pub fn new(
        backend: Option<Box<dyn DirectoryBackend>>,
        ldap: Option<&LdapConfig>,
        overrides: BTreeMap<String, GroupOverride>,
    ) -> Self {
        let (group_base, member_attr, people_base) = match ldap {
            Some(l) => (
                l.group_base.clone(),
                l.member_attr.clone(),
                l.people_base.clone(),
            ),
            None => (
                "cn={group},ou=project,ou=groups,dc=apache,dc=org".to_string(),
                "member".to_string(),
                "ou=people,dc=apache,dc=org".to_string(),
            ),
        };
        let uid_re = Regex::new(&format!(r"^uid=([^,]+),{}", regex::escape(&people_base)))
            .expect("escaped people base is a valid pattern");
        Self {
            backend,
            overrides,
            group_base,
            member_attr,
            uid_re,
        }
    }

    /// Account id from a person DN.
    pub fn parse_uid<'a>(&self, dn: &'a str) -> Option<&'a str> {
        self.uid_re
            .captures(dn)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

impl GroupDirectory for GroupResolver {
    fn members(&self, group: &str) -> Result<Vec<String>> {
        let over = self.overrides.get(group);

        if let Some(members) = over.and_then(|o| o.members.as_ref()) {
            tracing::warn!("using hardcoded member list for {group}");
            return Ok(members
                .iter()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect());
        }

        let Some(backend) = self.backend.as_ref() else {
            return Err(GrouperError::Directory {
                group: group.to_string(),
                reason: "no directory configured and no static member list".to_string(),
            });
        };

        let base = over
            .and_then(|o| o.ldap.clone())
            .unwrap_or_else(|| self.group_base.replace("{group}", group));
        let attribute = over
            .and_then(|o| o.ldapkey.as_deref())
            .unwrap_or(&self.member_attr);

        tracing::info!("fetching directory group {group} ({base})");
        let values = backend.search(&base, attribute).map_err(|e| match e {
            GrouperError::Directory { reason, .. } => GrouperError::Directory {
                group: group.to_string(),
                reason,
            },
            other => other,
        })?;

        let mut members: Vec<String> = values
            .iter()
            .filter_map(|dn| self.parse_uid(dn))
            .map(str::to_lowercase)
            .collect();
        members.sort();
        members.dedup();
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records searches and answers from a fixed table keyed by (base, attribute).
    #[derive(Default)]
    struct FakeBackend {
        entries: BTreeMap<(String, String), Vec<String>>,
        calls: RefCell<Vec<(String, String)>>,
        fail: bool,
    }

    impl DirectoryBackend for FakeBackend {
        fn search(&self, base: &str, attribute: &str) -> Result<Vec<String>> {
            self.calls
                .borrow_mut()
                .push((base.to_string(), attribute.to_string()));
            if self.fail {
                return Err(GrouperError::Directory {
                    group: base.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            Ok(self
                .entries
                .get(&(base.to_string(), attribute.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }

    fn dn(uid: &str) -> String {
        format!("uid={uid},ou=people,dc=apache,dc=org")
    }

    #[test]
    fn default_lookup_parses_and_sorts() {
        let mut backend = FakeBackend::default();
        backend.entries.insert(
            (
                "cn=foo,ou=project,ou=groups,dc=apache,dc=org".into(),
                "member".into(),
            ),
            vec![
                dn("bob"),
                dn("Alice"),
                "cn=robot,ou=services,dc=apache,dc=org".into(),
                dn("bob"),
            ],
        );
        let resolver = GroupResolver::new(Some(Box::new(backend)), None, BTreeMap::new());
        assert_eq!(resolver.members("foo").unwrap(), ["alice", "bob"]);
    }

    #[test]
    fn static_members_skip_the_directory() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "infra".to_string(),
            GroupOverride {
                members: Some(vec!["Zed".into(), " amy ".into(), "".into()]),
                ..Default::default()
            },
        );
        let backend = FakeBackend {
            fail: true,
            ..Default::default()
        };
        let resolver = GroupResolver::new(Some(Box::new(backend)), None, overrides);
        assert_eq!(resolver.members("infra").unwrap(), ["zed", "amy"]);
    }

    #[test]
    fn alternate_base_and_key() {
        let mut backend = FakeBackend::default();
        backend.entries.insert(
            ("cn=whimsy,ou=groups,dc=apache,dc=org".into(), "owner".into()),
            vec![dn("carol")],
        );
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "whimsy".to_string(),
            GroupOverride {
                members: None,
                ldap: Some("cn=whimsy,ou=groups,dc=apache,dc=org".into()),
                ldapkey: Some("owner".into()),
            },
        );
        let resolver = GroupResolver::new(Some(Box::new(backend)), None, overrides);
        assert_eq!(resolver.members("whimsy").unwrap(), ["carol"]);
    }

    #[test]
    fn backend_failure_names_the_group() {
        let backend = FakeBackend {
            fail: true,
            ..Default::default()
        };
        let resolver = GroupResolver::new(Some(Box::new(backend)), None, BTreeMap::new());
        match resolver.members("foo").unwrap_err() {
            GrouperError::Directory { group, reason } => {
                assert_eq!(group, "foo");
                assert!(reason.contains("refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn no_backend_is_directory_error() {
        let resolver = GroupResolver::new(None, None, BTreeMap::new());
        let err = resolver.members("foo").unwrap_err();
        assert!(err.is_project_scoped());
    }

    #[test]
    fn custom_people_base() {
        let ldap = LdapConfig {
            uri: "ldap://localhost".into(),
            bind_dn: "cn=x".into(),
            password: None,
            group_base: "cn={group},ou=teams,dc=example,dc=org".into(),
            member_attr: "uniqueMember".into(),
            people_base: "ou=staff,dc=example,dc=org".into(),
            timeout_secs: 5,
        };
        let resolver = GroupResolver::new(None, Some(&ldap), BTreeMap::new());
        assert_eq!(
            resolver.parse_uid("uid=dan,ou=staff,dc=example,dc=org"),
            Some("dan")
        );
        assert_eq!(resolver.parse_uid(&dn("dan")), None);
    }

    #[test]
    fn unreachable_server_fails_within_timeout() {
        let ldap = LdapConfig {
            uri: "ldap://127.0.0.1:1".into(),
            bind_dn: "cn=x".into(),
            password: None,
            group_base: "cn={group},ou=project,ou=groups,dc=apache,dc=org".into(),
            member_attr: "member".into(),
            people_base: "ou=people,dc=apache,dc=org".into(),
            timeout_secs: 2,
        };
        let backend = LdapBackend::new(&ldap);
        assert_eq!(backend.timeout, Duration::from_secs(2));

        let resolver = GroupResolver::new(Some(Box::new(backend)), Some(&ldap), BTreeMap::new());
        let started = std::time::Instant::now();
        match resolver.members("foo").unwrap_err() {
            GrouperError::Directory { group, .. } => assert_eq!(group, "foo"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
