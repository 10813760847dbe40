//! Team membership convergence.
//!
//! For each project the reconciler
//! 1. resolves (or creates) the `<project>-committers` team
//! 2. grants `push` on every matching org repo the team lacks
//! 3. reads the current members
//! 4. reads the committer list from the directory
//! 5. maps committers to GitHub logins, keeping only MFA-enabled ones
//! 6. bails out if nothing is left
//! 7. removes members not in the desired set and adds missing ones
//! 8. records the desired set for the access map
//!
//! Steps 4 and 6 are the safety stops: with no authoritative data the team
//! is left alone rather than emptied.

use crate::config::RemovalPolicy;
use crate::directory::GroupDirectory;
use crate::error::{ErrorClass, GrouperError, Result};
use crate::github::{GitHub, Permission, Team};
use crate::links::LinkStore;
use crate::mfa::{MfaFeed, MfaStatus};
use crate::project::{self, UMBRELLA};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

// ---------------------------------------------------------------------------
// Desired state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    Unlinked,
    MfaDisabled,
    MfaUnknown,
}

/// A committer left out of the desired set, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exclusion {
    pub asf_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_id: Option<String>,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Desired {
    /// In directory order, without duplicates.
    pub logins: Vec<String>,
    pub exclusions: Vec<Exclusion>,
}

/// Apply the link and MFA gates to a committer list.
pub fn resolve_desired(committers: &[String], links: &LinkStore, mfa: &MfaFeed) -> Desired {
    let mut desired = Desired::default();
    let mut seen = HashSet::new();
    for committer in committers {
        let Some(login) = links.github_for(committer) else {
            desired.exclusions.push(Exclusion {
                asf_id: committer.clone(),
                github_id: None,
                reason: ExclusionReason::Unlinked,
            });
            continue;
        };
        let reason = match mfa.status(login) {
            MfaStatus::Enabled => {
                if seen.insert(login.to_lowercase()) {
                    desired.logins.push(login.to_string());
                }
                continue;
            }
            MfaStatus::Disabled => ExclusionReason::MfaDisabled,
            MfaStatus::Unknown => ExclusionReason::MfaUnknown,
        };
        desired.exclusions.push(Exclusion {
            asf_id: committer.clone(),
            github_id: Some(login.to_string()),
            reason,
        });
    }
    desired
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MembershipDiff {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
    /// Observed members outside the desired set that the policy protects.
    pub exempt: Vec<String>,
}

impl MembershipDiff {
    pub fn compute(observed: &[String], desired: &[String], policy: &RemovalPolicy) -> Self {
        // GitHub logins are case-insensitive.
        let observed_set: HashSet<String> = observed.iter().map(|l| l.to_lowercase()).collect();
        let desired_set: HashSet<String> = desired.iter().map(|l| l.to_lowercase()).collect();

        let mut diff = MembershipDiff::default();
        for login in observed {
            if desired_set.contains(&login.to_lowercase()) {
                continue;
            }
            if policy.is_exempt(login) {
                diff.exempt.push(login.clone());
            } else {
                diff.to_remove.push(login.clone());
            }
        }
        let mut queued = HashSet::new();
        diff.to_add = desired
            .iter()
            .filter(|l| {
                let key = l.to_lowercase();
                !observed_set.contains(&key) && queued.insert(key)
            })
            .cloned()
            .collect();
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    pub fn mutation_count(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }
}

/// Org repos belonging to `project` that the team is not subscribed to.
///
/// With `local` set, only repos that also exist locally qualify.
pub fn missing_repos(
    project: &str,
    org_repos: &[String],
    subscribed: &[String],
    local: Option<&BTreeSet<String>>,
) -> Vec<String> {
    org_repos
        .iter()
        .filter(|repo| project::project_prefix(repo) == Some(project))
        .filter(|repo| !subscribed.contains(repo))
        .filter(|repo| local.map_or(true, |l| l.contains(repo.as_str())))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "target", rename_all = "snake_case")]
pub enum Mutation {
    CreateTeam(String),
    GrantRepo(String),
    AddMember(String),
    RemoveMember(String),
}

impl std::fmt::Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mutation::CreateTeam(t) => write!(f, "create team {t}"),
            Mutation::GrantRepo(r) => write!(f, "grant push on {r}"),
            Mutation::AddMember(l) => write!(f, "add {l}"),
            Mutation::RemoveMember(l) => write!(f, "remove {l}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedMutation {
    pub mutation: Mutation,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Dry run and the team does not exist yet.
    TeamMissing,
    DirectoryUnavailable(String),
    NoAuthoritativeMembers,
    NoEligibleMembers,
    FetchFailed(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::TeamMissing => write!(f, "team does not exist (dry run)"),
            SkipReason::DirectoryUnavailable(e) => write!(f, "directory unavailable: {e}"),
            SkipReason::NoAuthoritativeMembers => write!(f, "no group data returned"),
            SkipReason::NoEligibleMembers => write!(f, "no eligible members after filtering"),
            SkipReason::FetchFailed(e) => write!(f, "fetch failed: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectOutcome {
    pub project: String,
    pub team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    pub desired: Vec<String>,
    /// Every mutation decided on, issued or not (dry run).
    pub planned: Vec<Mutation>,
    pub failed: Vec<FailedMutation>,
    pub exempt: Vec<String>,
    pub exclusions: Vec<Exclusion>,
}

impl ProjectOutcome {
    fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            team: None,
            skipped: None,
            desired: Vec::new(),
            planned: Vec::new(),
            failed: Vec::new(),
            exempt: Vec::new(),
            exclusions: Vec::new(),
        }
    }

    pub fn converged(&self) -> bool {
        self.skipped.is_none()
    }

    pub fn count(&self, pred: impl Fn(&Mutation) -> bool) -> usize {
        self.planned.iter().filter(|m| pred(m)).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub projects: usize,
    pub converged: usize,
    pub skipped: usize,
    pub teams_created: usize,
    pub repos_granted: usize,
    pub members_added: usize,
    pub members_removed: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub outcomes: Vec<ProjectOutcome>,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        let mut s = RunSummary {
            projects: self.outcomes.len(),
            ..Default::default()
        };
        for o in &self.outcomes {
            if o.converged() {
                s.converged += 1;
            } else {
                s.skipped += 1;
            }
            s.teams_created += o.count(|m| matches!(m, Mutation::CreateTeam(_)));
            s.repos_granted += o.count(|m| matches!(m, Mutation::GrantRepo(_)));
            s.members_added += o.count(|m| matches!(m, Mutation::AddMember(_)));
            s.members_removed += o.count(|m| matches!(m, Mutation::RemoveMember(_)));
            s.failures += o.failed.len();
        }
        s
    }

    /// Desired logins per converged project.
    pub fn writers(&self) -> BTreeMap<String, Vec<String>> {
        self.outcomes
            .iter()
            .filter(|o| o.converged())
            .map(|o| (o.project.clone(), o.desired.clone()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// Org-wide state fetched once per run.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    /// Committer teams keyed by project.
    pub teams: BTreeMap<String, Team>,
    /// Every org repository name.
    pub repos: Vec<String>,
}

impl Inventory {
    pub fn from_parts(teams: Vec<Team>, repos: Vec<String>) -> Self {
        let teams = teams
            .into_iter()
            .filter_map(|t| {
                let project = project::project_for_team_slug(&t.slug)?.to_string();
                Some((project, t))
            })
            .collect();
        Self { teams, repos }
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler<'a> {
    github: &'a dyn GitHub,
    directory: &'a dyn GroupDirectory,
    links: &'a LinkStore,
    mfa: &'a MfaFeed,
    policy: &'a RemovalPolicy,
    local_repos: Option<&'a BTreeSet<String>>,
    dry_run: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        github: &'a dyn GitHub,
        directory: &'a dyn GroupDirectory,
        links: &'a LinkStore,
        mfa: &'a MfaFeed,
        policy: &'a RemovalPolicy,
    ) -> Self {
        Self {
            github,
            directory,
            links,
            mfa,
            policy,
            local_repos: None,
            dry_run: false,
        }
    }

    /// Compute and log everything, issue no writes.
    pub fn dry_run(mut self, on: bool) -> Self {
        self.dry_run = on;
        self
    }

    /// Only grant repos present in this set.
    pub fn with_local_repos(mut self, repos: &'a BTreeSet<String>) -> Self {
        self.local_repos = Some(repos);
        self
    }

    pub fn inventory(&self) -> Result<Inventory> {
        tracing::info!("fetching GitHub teams");
        let teams = self.github.list_teams()?;
        tracing::info!("fetching GitHub repos, this may take a while");
        let repos = self.github.list_org_repos()?;
        let inventory = Inventory::from_parts(teams, repos);
        tracing::info!(
            "found {} committer teams and {} repos",
            inventory.teams.len(),
            inventory.repos.len()
        );
        Ok(inventory)
    }

    /// Reconcile every project, in the order given.
    ///
    /// Per-project failures end up on the outcome; setup and fatal errors
    /// abort the run.
    pub fn run<I, S>(&self, projects: I) -> Result<RunReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let started_at = Utc::now();
        let mut inventory = self.inventory()?;
        let mut outcomes = Vec::new();
        for project in projects {
            let project = project.as_ref();
            if project == UMBRELLA {
                continue;
            }
            outcomes.push(self.reconcile(project, &mut inventory)?);
            tracing::info!("done with {project}, moving to next project");
        }
        tracing::info!("all done with this run");
        Ok(RunReport {
            started_at,
            finished_at: Utc::now(),
            dry_run: self.dry_run,
            outcomes,
        })
    }

    /// Converge a single project. `inventory` gains any team created here.
    pub fn reconcile(&self, project: &str, inventory: &mut Inventory) -> Result<ProjectOutcome> {
        tracing::info!("processing GitHub team for {project}");
        let mut outcome = ProjectOutcome::new(project);
        match self.converge(project, inventory, &mut outcome) {
            Ok(()) => Ok(outcome),
            Err(e) if e.is_project_scoped() => {
                let reason = match e.class() {
                    ErrorClass::MissingAuthority => SkipReason::DirectoryUnavailable(e.to_string()),
                    _ => SkipReason::FetchFailed(e.to_string()),
                };
                tracing::warn!("skipping {project}: {reason}");
                outcome.skipped = Some(reason);
                Ok(outcome)
            }
            Err(e) => Err(e),
        }
    }

    fn converge(
        &self,
        project: &str,
        inventory: &mut Inventory,
        outcome: &mut ProjectOutcome,
    ) -> Result<()> {
        // 1. team
        let team = match inventory.teams.get(project) {
            Some(team) => {
                tracing::info!("team {} exists on GitHub", team.slug);
                team.clone()
            }
            None if self.dry_run => {
                let slug = project::team_slug(project);
                tracing::info!("team {slug} does not exist; would create it");
                outcome.planned.push(Mutation::CreateTeam(slug));
                outcome.skipped = Some(SkipReason::TeamMissing);
                return Ok(());
            }
            None => {
                tracing::info!("team does not yet exist on GitHub, creating");
                let team = self
                    .github
                    .create_team(&project::team_name(project))
                    .map_err(|e| GrouperError::TeamCreation {
                        project: project.to_string(),
                        reason: e.to_string(),
                    })?;
                tracing::info!("new GitHub team created as #{} ({})", team.id, team.slug);
                outcome.planned.push(Mutation::CreateTeam(team.slug.clone()));
                inventory.teams.insert(project.to_string(), team.clone());
                team
            }
        };
        outcome.team = Some(team.slug.clone());

        // 2. repos (additive only)
        let subscribed = self.github.team_repos(&team)?;
        tracing::info!("team is subscribed to: {}", subscribed.join(", "));
        for repo in missing_repos(project, &inventory.repos, &subscribed, self.local_repos) {
            tracing::info!("need to add {repo} repo to the team");
            self.apply(outcome, Mutation::GrantRepo(repo.clone()), || {
                self.github.grant_repo(&team, &repo, Permission::Push)
            });
        }

        // 3. observed
        let observed = self.github.team_members(&team)?;
        tracing::info!("{}: {}", team.slug, observed.join(", "));

        // 4. authority
        let committers = self.directory.members(project)?;
        if committers.is_empty() {
            tracing::warn!("no group data returned for {project}, trying next project");
            outcome.skipped = Some(SkipReason::NoAuthoritativeMembers);
            return Ok(());
        }

        // 5. gates
        let desired = resolve_desired(&committers, self.links, self.mfa);
        for ex in &desired.exclusions {
            match (ex.reason, ex.github_id.as_deref()) {
                (ExclusionReason::MfaDisabled, Some(gh)) => {
                    tracing::warn!("{gh} does not have MFA enabled, can't add to team")
                }
                (ExclusionReason::MfaUnknown, Some(gh)) => tracing::warn!(
                    "{gh} is in neither MFA list; likely an unaccepted org invite"
                ),
                _ => tracing::warn!(
                    "{} has not linked ASF and GitHub ids yet, ignoring",
                    ex.asf_id
                ),
            }
        }
        outcome.exclusions = desired.exclusions;

        // 6. never converge to an empty team
        if desired.logins.is_empty() {
            tracing::warn!("no eligible GitHub team could be built for {project}, skipping");
            outcome.skipped = Some(SkipReason::NoEligibleMembers);
            return Ok(());
        }

        // 7. diff and act
        let diff = MembershipDiff::compute(&observed, &desired.logins, self.policy);
        if diff.is_empty() {
            tracing::info!("{} is in sync", team.slug);
        } else {
            tracing::info!("{}: {} membership changes", team.slug, diff.mutation_count());
        }
        for login in &diff.exempt {
            tracing::info!("not removing {login} (exempt account)");
        }
        for login in &diff.to_remove {
            tracing::info!("{login} should not be a part of this team, removing");
            self.apply(outcome, Mutation::RemoveMember(login.clone()), || {
                self.github.remove_member(&team, login)
            });
        }
        for login in &diff.to_add {
            tracing::info!("{login} not found in GitHub team, adding");
            self.apply(outcome, Mutation::AddMember(login.clone()), || {
                self.github.add_member(&team, login)
            });
        }
        outcome.exempt = diff.exempt;

        // 8. record
        outcome.desired = desired.logins;
        Ok(())
    }

    fn apply(
        &self,
        outcome: &mut ProjectOutcome,
        mutation: Mutation,
        call: impl FnOnce() -> Result<()>,
    ) {
        if !self.dry_run {
            if let Err(e) = call() {
                tracing::error!("{}: {mutation} failed: {e}", outcome.project);
                outcome.failed.push(FailedMutation {
                    mutation: mutation.clone(),
                    error: e.to_string(),
                });
            }
        }
        outcome.planned.push(mutation);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
