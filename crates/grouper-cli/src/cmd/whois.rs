use crate::context;
use crate::output::print_json;
use grouper_core::mfa::MfaStatus;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct Whois {
    asf_id: String,
    github_id: Option<String>,
    mfa: Option<MfaStatus>,
    /// Would be kept on (or added to) committer teams.
    eligible: bool,
}

/// Answers "why isn't X on the team?" from the same sources a run uses.
pub fn run(config_path: &Path, asf_id: &str, json: bool) -> anyhow::Result<()> {
    let config = context::load_config(config_path)?;
    let sources = context::load_sources(&config)?;

    let asf_id = asf_id.trim().to_lowercase();
    let github_id = sources.links.github_for(&asf_id).map(str::to_string);
    let mfa = github_id.as_deref().map(|login| sources.mfa.status(login));
    let info = Whois {
        eligible: mfa == Some(MfaStatus::Enabled),
        asf_id,
        github_id,
        mfa,
    };

    if json {
        return print_json(&info);
    }

    println!("ASF id:   {}", info.asf_id);
    match (&info.github_id, info.mfa) {
        (Some(login), Some(mfa)) => {
            println!("GitHub:   {login}");
            println!("MFA:      {mfa}");
        }
        _ => println!("GitHub:   (not linked)"),
    }
    println!(
        "Eligible: {}",
        if info.eligible { "yes" } else { "no" }
    );
    Ok(())
}
