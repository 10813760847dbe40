use crate::context;
use crate::output::{print_json, print_table};
use anyhow::Context;
use grouper_core::project::{discover_projects, team_slug, ProjectKind, UMBRELLA};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ProjectRow {
    project: String,
    kind: ProjectKind,
    team: String,
}

pub fn run(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = context::load_config(config_path)?;
    let projects =
        discover_projects(&config.sources.git_dirs).context("failed to discover projects")?;

    let rows: Vec<ProjectRow> = projects
        .into_iter()
        .filter(|(name, _)| name != UMBRELLA)
        .map(|(project, kind)| ProjectRow {
            team: team_slug(&project),
            project,
            kind,
        })
        .collect();

    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No projects found.");
        return Ok(());
    }
    print_table(
        &["PROJECT", "KIND", "TEAM"],
        rows.iter()
            .map(|r| vec![r.project.clone(), r.kind.to_string(), r.team.clone()])
            .collect(),
    );
    Ok(())
}
