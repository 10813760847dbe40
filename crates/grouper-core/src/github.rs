//! GitHub REST access for committer teams.
//!
//! The reconciler talks to [`GitHub`]; [`GitHubClient`] is the blocking
//! HTTP implementation. List calls go through [`Pages`] and retry on
//! network failures and abuse-detection responses. A primary rate-limit
//! response or any other error status is returned as-is.

use crate::config::{GitHubConfig, PageCaps};
use crate::error::{ErrorClass, GrouperError, Result};
use crate::paginate::Pages;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: u64,
    pub slug: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Pull,
    Triage,
    Push,
    Maintain,
    Admin,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Permission::Pull => "pull",
            Permission::Triage => "triage",
            Permission::Push => "push",
            Permission::Maintain => "maintain",
            Permission::Admin => "admin",
        };
        f.write_str(s)
    }
}

#[derive(Deserialize)]
struct Member {
    login: String,
}

#[derive(Deserialize)]
struct Repo {
    name: String,
}

// ---------------------------------------------------------------------------
// GitHub trait
// ---------------------------------------------------------------------------

/// The slice of the GitHub API the reconciler needs.
pub trait GitHub {
    fn list_teams(&self) -> Result<Vec<Team>>;
    fn list_org_repos(&self) -> Result<Vec<String>>;
    fn team_members(&self, team: &Team) -> Result<Vec<String>>;
    fn team_repos(&self, team: &Team) -> Result<Vec<String>>;
    fn create_team(&self, name: &str) -> Result<Team>;
    fn add_member(&self, team: &Team, login: &str) -> Result<()>;
    fn remove_member(&self, team: &Team, login: &str) -> Result<()>;
    fn grant_repo(&self, team: &Team, repo: &str, permission: Permission) -> Result<()>;
}

// ---------------------------------------------------------------------------
// GitHubClient
// ---------------------------------------------------------------------------

pub struct GitHubClient {
    http: Client,
    api_url: String,
    org: String,
    per_page: u32,
    max_attempts: u32,
    abuse_backoff: Duration,
    caps: PageCaps,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let token = config
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GrouperError::Config("no GitHub token configured".to_string()))?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| GrouperError::Config("GitHub token is not a valid header".to_string()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );

        let http = Client::builder()
            .user_agent("grouper")
            .default_headers(headers)
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            org: config.org.clone(),
            per_page: config.per_page.clamp(1, 100),
            max_attempts: config.max_attempts.max(1),
            abuse_backoff: config.abuse_backoff(),
            caps: config.page_caps.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn team_path(&self, team: &Team) -> String {
        format!("/orgs/{}/teams/{}", self.org, team.slug)
    }

    /// Delay before retrying after a transport failure: `abuse_backoff`
    /// times the attempt number. Nothing is slept after the last attempt.
    fn network_backoff(&self, attempt: u32) -> Duration {
        if attempt >= self.max_attempts {
            Duration::ZERO
        } else {
            self.abuse_backoff * attempt
        }
    }

    /// GET with retries. Abuse-detection and transport failures are retried
    /// up to `max_attempts`; rate limiting and other statuses are not.
    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        for attempt in 1..=self.max_attempts {
            let resp = match self.http.get(url).send() {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!("request to {url} failed (attempt {attempt}): {e}");
                    std::thread::sleep(self.network_backoff(attempt));
                    continue;
                }
            };

            let status = resp.status();
            if status.is_success() {
                let body = match resp.text() {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::warn!("reading body of {url} failed (attempt {attempt}): {e}");
                        std::thread::sleep(self.network_backoff(attempt));
                        continue;
                    }
                };
                return serde_json::from_str(&body).map_err(|source| GrouperError::Payload {
                    url: url.to_string(),
                    source,
                });
            }

            let body = resp.text().unwrap_or_default();
            tracing::warn!("GitHub responded with error code {} on {url}", status.as_u16());
            if body.contains("abuse") || body.contains("secondary rate limit") {
                tracing::warn!("hit GitHub's abuse detector, sleeping it off");
                std::thread::sleep(self.abuse_backoff);
                continue;
            }
            if body.contains("API rate limit exceeded") {
                tracing::error!("API rate limit hit, cannot continue");
                return Err(GrouperError::RateLimited {
                    url: url.to_string(),
                });
            }
            return Err(GrouperError::GitHubStatus {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }
        tracing::warn!("giving up on {url}");
        Err(GrouperError::RetriesExhausted {
            url: url.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Read a whole listing. A listing that gives out part way through is
    /// re-read once from page 1; pages shift under concurrent changes, so
    /// resuming mid-way could skip or repeat entries.
    fn list<T: DeserializeOwned>(&self, path: &str, cap: u32) -> Result<Vec<T>> {
        let base = self.url(path);
        let mut pages = Pages::new(path, cap, |page| {
            self.get_json(&format!("{base}?per_page={}&page={page}", self.per_page))
        });
        match pages.collect_all() {
            Err(e) if e.class() == ErrorClass::Transient && pages.position() > 1 => {
                tracing::warn!(
                    "{path}: listing failed at page {}, re-reading from page 1: {e}",
                    pages.position()
                );
                pages.restart();
                pages.collect_all()
            }
            result => result,
        }
    }

    /// Single write call. No retries: a failed write is reported and the
    /// next run tries again from fresh state.
    fn send(&self, req: RequestBuilder, what: &str, url: &str) -> Result<reqwest::blocking::Response> {
        let resp = req.send()?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().unwrap_or_default();
        tracing::debug!("{what} failed with {status}: {body}");
        Err(GrouperError::GitHubStatus {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        })
    }
}

impl GitHub for GitHubClient {
    fn list_teams(&self) -> Result<Vec<Team>> {
        let path = format!("/orgs/{}/teams", self.org);
        self.list(&path, self.caps.teams)
    }

    fn list_org_repos(&self) -> Result<Vec<String>> {
        let path = format!("/orgs/{}/repos", self.org);
        let repos: Vec<Repo> = self.list(&path, self.caps.repos)?;
        let mut names: Vec<String> = repos.into_iter().map(|r| r.name).collect();
        names.sort();
        Ok(names)
    }

    fn team_members(&self, team: &Team) -> Result<Vec<String>> {
        let path = format!("{}/members", self.team_path(team));
        let members: Vec<Member> = self.list(&path, self.caps.members)?;
        let mut logins: Vec<String> = members.into_iter().map(|m| m.login).collect();
        logins.sort();
        Ok(logins)
    }

    fn team_repos(&self, team: &Team) -> Result<Vec<String>> {
        let path = format!("{}/repos", self.team_path(team));
        let repos: Vec<Repo> = self.list(&path, self.caps.team_repos)?;
        let mut names: Vec<String> = repos.into_iter().map(|r| r.name).collect();
        names.sort();
        Ok(names)
    }

    fn create_team(&self, name: &str) -> Result<Team> {
        let url = self.url(&format!("/orgs/{}/teams", self.org));
        let req = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "name": name }));
        let body = self.send(req, "create team", &url)?.text()?;
        serde_json::from_str(&body).map_err(|source| GrouperError::Payload { url, source })
    }

    fn add_member(&self, team: &Team, login: &str) -> Result<()> {
        let url = self.url(&format!("{}/memberships/{login}", self.team_path(team)));
        let req = self
            .http
            .put(&url)
            .json(&serde_json::json!({ "role": "member" }));
        self.send(req, "add member", &url)?;
        Ok(())
    }

    fn remove_member(&self, team: &Team, login: &str) -> Result<()> {
        let url = self.url(&format!("{}/memberships/{login}", self.team_path(team)));
        self.send(self.http.delete(&url), "remove member", &url)?;
        Ok(())
    }

    fn grant_repo(&self, team: &Team, repo: &str, permission: Permission) -> Result<()> {
        let url = self.url(&format!(
            "{}/repos/{}/{repo}",
            self.team_path(team),
            self.org
        ));
        let req = self
            .http
            .put(&url)
            .json(&serde_json::json!({ "permission": permission }));
        self.send(req, "grant repo", &url)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
