use crate::error::{GrouperError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const GITHUB_TOKEN_ENV: &str = "GROUPER_GITHUB_TOKEN";
pub const LDAP_PASSWORD_ENV: &str = "GROUPER_LDAP_PASSWORD";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// GitHubConfig
// ---------------------------------------------------------------------------

/// Upper bounds on how many pages each listing may fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageCaps {
    #[serde(default = "default_team_pages")]
    pub teams: u32,
    #[serde(default = "default_repo_pages")]
    pub repos: u32,
    #[serde(default = "default_member_pages")]
    pub members: u32,
    #[serde(default = "default_team_repo_pages")]
    pub team_repos: u32,
}

fn default_team_pages() -> u32 {
    100
}

fn default_repo_pages() -> u32 {
    150
}

fn default_member_pages() -> u32 {
    100
}

fn default_team_repo_pages() -> u32 {
    50
}

impl Default for PageCaps {
    fn default() -> Self {
        Self {
            teams: default_team_pages(),
            repos: default_repo_pages(),
            members: default_member_pages(),
            team_repos: default_team_repo_pages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_org")]
    pub org: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Usually supplied through `GROUPER_GITHUB_TOKEN` instead of the file.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_abuse_backoff")]
    pub abuse_backoff_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub page_caps: PageCaps,
}

fn default_org() -> String {
    "apache".to_string()
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_per_page() -> u32 {
    30
}

fn default_max_attempts() -> u32 {
    5
}

fn default_abuse_backoff() -> u64 {
    10
}

fn default_timeout() -> u64 {
    30
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            org: default_org(),
            api_url: default_api_url(),
            token: None,
            per_page: default_per_page(),
            max_attempts: default_max_attempts(),
            abuse_backoff_secs: default_abuse_backoff(),
            timeout_secs: default_timeout(),
            page_caps: PageCaps::default(),
        }
    }
}

impl GitHubConfig {
    pub fn abuse_backoff(&self) -> Duration {
        Duration::from_secs(self.abuse_backoff_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// LdapConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    #[serde(default = "default_ldap_uri")]
    pub uri: String,
    pub bind_dn: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Search base for a project group; `{group}` is replaced by the project.
    #[serde(default = "default_group_base")]
    pub group_base: String,
    #[serde(default = "default_member_attr")]
    pub member_attr: String,
    #[serde(default = "default_people_base")]
    pub people_base: String,
    /// Applies to connecting and to each bind or search.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_ldap_uri() -> String {
    "ldaps://ldap-us-ro.apache.org:636".to_string()
}

fn default_group_base() -> String {
    "cn={group},ou=project,ou=groups,dc=apache,dc=org".to_string()
}

fn default_member_attr() -> String {
    "member".to_string()
}

fn default_people_base() -> String {
    "ou=people,dc=apache,dc=org".to_string()
}

impl LdapConfig {
    pub fn base_for(&self, group: &str) -> String {
        self.group_base.replace("{group}", group)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// GroupOverride
// ---------------------------------------------------------------------------

/// Per-project replacement for the default directory lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupOverride {
    /// Static member list; when present the directory is not consulted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<String>>,
    /// Alternate search base.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap: Option<String>,
    /// Alternate attribute holding member DNs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldapkey: Option<String>,
}

// ---------------------------------------------------------------------------
// SourcesConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Directories holding bare `<repo>.git` repositories.
    #[serde(default)]
    pub git_dirs: Vec<PathBuf>,
    /// When set, a repo is only granted to a team if `<dir>/<repo>.git` exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_repos: Option<PathBuf>,
    #[serde(default = "default_link_db")]
    pub link_db: PathBuf,
    #[serde(default = "default_mfa_feed")]
    pub mfa_feed: PathBuf,
}

fn default_link_db() -> PathBuf {
    PathBuf::from("/x1/gitbox/db/gitbox.db")
}

fn default_mfa_feed() -> PathBuf {
    PathBuf::from("mfa.json")
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            git_dirs: Vec::new(),
            public_repos: None,
            link_db: default_link_db(),
            mfa_feed: default_mfa_feed(),
        }
    }
}

// ---------------------------------------------------------------------------
// RemovalPolicy
// ---------------------------------------------------------------------------

/// Accounts that are never removed from a team, whatever the directory says.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemovalPolicy {
    /// Exact logins, compared case-insensitively.
    #[serde(default)]
    pub logins: Vec<String>,
    /// Login prefixes, compared as-is.
    #[serde(default)]
    pub prefixes: Vec<String>,
}

impl RemovalPolicy {
    pub fn is_exempt(&self, login: &str) -> bool {
        self.logins.iter().any(|l| l.eq_ignore_ascii_case(login))
            || self.prefixes.iter().any(|p| login.starts_with(p.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap: Option<LdapConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, GroupOverride>,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub removal_exempt: RemovalPolicy,
}

fn default_output() -> PathBuf {
    PathBuf::from("ghmap.json")
}

impl Config {
    /// Load from a YAML file and apply secret overrides from the environment.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GrouperError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(path)?;
        let mut cfg = Self::from_yaml(&data)?;
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    /// Fill secrets from `lookup`; values already in the file lose.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(GITHUB_TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.github.token = Some(token);
        }
        if let Some(ldap) = self.ldap.as_mut() {
            if let Some(pw) = lookup(LDAP_PASSWORD_ENV).filter(|p| !p.is_empty()) {
                ldap.password = Some(pw);
            }
        }
    }

    pub fn group(&self, project: &str) -> Option<&GroupOverride> {
        self.groups.get(project)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        if self.github.token.as_deref().map_or(true, str::is_empty) {
            push(
                WarnLevel::Error,
                format!("no GitHub token: set github.token or {GITHUB_TOKEN_ENV}"),
            );
        }
        if self.github.max_attempts == 0 {
            push(
                WarnLevel::Error,
                "github.max_attempts must be at least 1".to_string(),
            );
        }
        if self.github.per_page == 0 || self.github.per_page > 100 {
            push(
                WarnLevel::Warning,
                format!(
                    "github.per_page={} is outside GitHub's 1..=100 range",
                    self.github.per_page
                ),
            );
        }
        let caps = &self.github.page_caps;
        for (name, cap) in [
            ("teams", caps.teams),
            ("repos", caps.repos),
            ("members", caps.members),
            ("team_repos", caps.team_repos),
        ] {
            if cap == 0 {
                push(
                    WarnLevel::Error,
                    format!("github.page_caps.{name} is 0; nothing would be fetched"),
                );
            }
        }

        if self.sources.git_dirs.is_empty() {
            push(
                WarnLevel::Error,
                "sources.git_dirs is empty; no projects can be discovered".to_string(),
            );
        }

        match &self.ldap {
            None => push(
                WarnLevel::Warning,
                "no ldap section: only groups with a static member list will be reconciled"
                    .to_string(),
            ),
            Some(ldap) => {
                if !ldap.group_base.contains("{group}") {
                    push(
                        WarnLevel::Error,
                        format!(
                            "ldap.group_base '{}' has no {{group}} placeholder",
                            ldap.group_base
                        ),
                    );
                }
                if ldap.password.as_deref().map_or(true, str::is_empty) {
                    push(
                        WarnLevel::Warning,
                        format!("no LDAP password: set ldap.password or {LDAP_PASSWORD_ENV}"),
                    );
                }
            }
        }

        for (group, over) in &self.groups {
            if let Some(members) = &over.members {
                if members.is_empty() {
                    push(
                        WarnLevel::Warning,
                        format!("groups.{group}.members is empty; the project will be skipped"),
                    );
                }
                if over.ldap.is_some() || over.ldapkey.is_some() {
                    push(
                        WarnLevel::Warning,
                        format!("groups.{group} sets members and ldap options; members wins"),
                    );
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
github:
  org: apache
  token: secret
ldap:
  bind_dn: cn=grouper,ou=users,dc=apache,dc=org
  password: hunter2
groups:
  infra:
    members: [alice, bob]
  whimsy:
    ldap: cn=whimsy,ou=groups,dc=apache,dc=org
    ldapkey: owner
sources:
  git_dirs: [/x1/repos/asf, /x1/repos/private]
  public_repos: /x1/repos/asf
removal_exempt:
  logins: [humbedooh]
  prefixes: [asf-ci]
"#;

    #[test]
    fn parses_sample_with_defaults() {
        let cfg = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.github.org, "apache");
        assert_eq!(cfg.github.api_url, "https://api.github.com");
        assert_eq!(cfg.github.max_attempts, 5);
        assert_eq!(cfg.github.page_caps.repos, 150);
        assert_eq!(cfg.sources.git_dirs.len(), 2);
        assert_eq!(cfg.output, PathBuf::from("ghmap.json"));

        let ldap = cfg.ldap.as_ref().unwrap();
        assert_eq!(ldap.member_attr, "member");
        assert_eq!(ldap.timeout(), Duration::from_secs(30));
        assert_eq!(
            ldap.base_for("foo"),
            "cn=foo,ou=project,ou=groups,dc=apache,dc=org"
        );

        let infra = cfg.group("infra").unwrap();
        assert_eq!(infra.members.as_deref().unwrap(), ["alice", "bob"]);
        assert_eq!(cfg.group("whimsy").unwrap().ldapkey.as_deref(), Some("owner"));
    }

    #[test]
    fn env_overrides_secrets() {
        let mut cfg = Config::from_yaml(SAMPLE).unwrap();
        cfg.apply_env(|key| match key {
            GITHUB_TOKEN_ENV => Some("from-env".to_string()),
            LDAP_PASSWORD_ENV => Some("ldap-env".to_string()),
            _ => None,
        });
        assert_eq!(cfg.github.token.as_deref(), Some("from-env"));
        assert_eq!(cfg.ldap.unwrap().password.as_deref(), Some("ldap-env"));
    }

    #[test]
    fn empty_env_value_is_ignored() {
        let mut cfg = Config::from_yaml(SAMPLE).unwrap();
        cfg.apply_env(|_| Some(String::new()));
        assert_eq!(cfg.github.token.as_deref(), Some("secret"));
    }

    #[test]
    fn secrets_are_not_serialized() {
        let cfg = Config::from_yaml(SAMPLE).unwrap();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        assert!(!yaml.contains("secret"));
        assert!(!yaml.contains("hunter2"));
    }

    #[test]
    fn sample_validates_cleanly() {
        let cfg = Config::from_yaml(SAMPLE).unwrap();
        let warnings = cfg.validate();
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn validate_flags_missing_token_and_dirs() {
        let cfg = Config::from_yaml("github:\n  org: apache\n").unwrap();
        let warnings = cfg.validate();
        let errors: Vec<_> = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .collect();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|w| w.message.contains("GitHub token")));
        assert!(errors.iter().any(|w| w.message.contains("git_dirs")));
        assert!(warnings.iter().any(|w| w.message.contains("no ldap section")));
    }

    #[test]
    fn validate_flags_bad_group_base() {
        let yaml = r#"
github: { token: t }
ldap:
  bind_dn: cn=x
  password: y
  group_base: cn=static,dc=apache,dc=org
sources: { git_dirs: [/tmp] }
"#;
        let cfg = Config::from_yaml(yaml).unwrap();
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("{group}")));
    }

    #[test]
    fn removal_policy_matches_login_and_prefix() {
        let policy = RemovalPolicy {
            logins: vec!["humbedooh".into()],
            prefixes: vec!["asf-ci".into()],
        };
        assert!(policy.is_exempt("Humbedooh"));
        assert!(policy.is_exempt("asf-ci-deploy"));
        assert!(!policy.is_exempt("carol-gh"));
        assert!(!RemovalPolicy::default().is_exempt("humbedooh"));
    }
}
