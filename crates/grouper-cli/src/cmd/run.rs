use crate::context;
use crate::output::{print_json, print_table};
use anyhow::Context;
use grouper_core::project::{discover_projects, UMBRELLA};
use grouper_core::reconcile::{Mutation, ProjectOutcome, Reconciler, RunReport};
use grouper_core::report::AccessMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

pub fn run(
    config_path: &Path,
    dry_run: bool,
    output: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let config = context::load_config(config_path)?;

    tracing::info!("compiling list of projects, this might take a moment");
    let projects =
        discover_projects(&config.sources.git_dirs).context("failed to discover projects")?;
    tracing::info!("found {} projects", projects.len());

    let sources = context::load_sources(&config)?;
    let directory = context::directory(&config);
    let github = context::github(&config)?;
    let local = context::local_repos(&config)?;

    let mut reconciler = Reconciler::new(
        &github,
        &directory,
        &sources.links,
        &sources.mfa,
        &config.removal_exempt,
    )
    .dry_run(dry_run);
    if let Some(local) = &local {
        reconciler = reconciler.with_local_repos(local);
    }

    let report = reconciler
        .run(projects.keys())
        .context("reconciliation aborted")?;

    if dry_run {
        tracing::info!("dry run, access map not written");
    } else {
        let path = output.unwrap_or_else(|| config.output.clone());
        AccessMap::build(&report, &sources.links)
            .save(&path)
            .with_context(|| format!("failed to write access map {}", path.display()))?;
        tracing::info!("wrote access map to {}", path.display());
    }

    print_report(&report, json)
}

// ---------------------------------------------------------------------------
// project
// ---------------------------------------------------------------------------

pub fn run_project(config_path: &Path, name: &str, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let name = name.trim().to_lowercase();
    if name.is_empty() || name == UMBRELLA {
        anyhow::bail!("'{name}' is not a reconcilable project");
    }

    let config = context::load_config(config_path)?;

    // Only projects with a repository on disk may get a team.
    let projects =
        discover_projects(&config.sources.git_dirs).context("failed to discover projects")?;
    if !projects.contains_key(&name) {
        anyhow::bail!(
            "no repository for '{name}' in the configured git directories; \
             refusing to reconcile or create its team"
        );
    }

    let sources = context::load_sources(&config)?;
    let directory = context::directory(&config);
    let github = context::github(&config)?;
    let local = context::local_repos(&config)?;

    let mut reconciler = Reconciler::new(
        &github,
        &directory,
        &sources.links,
        &sources.mfa,
        &config.removal_exempt,
    )
    .dry_run(dry_run);
    if let Some(local) = &local {
        reconciler = reconciler.with_local_repos(local);
    }

    let mut inventory = reconciler
        .inventory()
        .context("failed to fetch GitHub inventory")?;
    let outcome = reconciler
        .reconcile(&name, &mut inventory)
        .with_context(|| format!("reconciliation of {name} aborted"))?;

    if json {
        return print_json(&outcome);
    }
    print_outcomes(std::slice::from_ref(&outcome));
    for m in &outcome.planned {
        println!("  {m}");
    }
    for f in &outcome.failed {
        println!("  [failed] {}: {}", f.mutation, f.error);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    let summary = report.summary();
    if json {
        let value = serde_json::json!({
            "started_at": report.started_at,
            "finished_at": report.finished_at,
            "dry_run": report.dry_run,
            "summary": summary,
            "outcomes": report.outcomes,
        });
        return print_json(&value);
    }

    print_outcomes(&report.outcomes);
    println!();
    println!(
        "{} projects: {} converged, {} skipped; {} teams created, {} repos granted, +{} -{} members, {} failed writes{}",
        summary.projects,
        summary.converged,
        summary.skipped,
        summary.teams_created,
        summary.repos_granted,
        summary.members_added,
        summary.members_removed,
        summary.failures,
        if report.dry_run { " (dry run)" } else { "" },
    );
    Ok(())
}

fn print_outcomes(outcomes: &[ProjectOutcome]) {
    let rows = outcomes
        .iter()
        .map(|o| {
            let status = match &o.skipped {
                Some(reason) => format!("skipped: {reason}"),
                None if !o.failed.is_empty() => "partial".to_string(),
                None => "ok".to_string(),
            };
            vec![
                o.project.clone(),
                o.team.clone().unwrap_or_else(|| "-".to_string()),
                o.desired.len().to_string(),
                o.count(|m| matches!(m, Mutation::AddMember(_))).to_string(),
                o.count(|m| matches!(m, Mutation::RemoveMember(_))).to_string(),
                o.count(|m| matches!(m, Mutation::GrantRepo(_))).to_string(),
                status,
            ]
        })
        .collect();
    print_table(
        &["PROJECT", "TEAM", "DESIRED", "ADD", "REMOVE", "GRANT", "STATUS"],
        rows,
    );
}
