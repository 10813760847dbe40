//! Builds the concrete sources and clients a command needs from the config.

use anyhow::Context;
use grouper_core::config::Config;
use grouper_core::directory::{DirectoryBackend, GroupResolver, LdapBackend};
use grouper_core::github::GitHubClient;
use grouper_core::links::LinkStore;
use grouper_core::mfa::MfaFeed;
use grouper_core::project;
use std::collections::BTreeSet;
use std::path::Path;

pub struct Sources {
    pub links: LinkStore,
    pub mfa: MfaFeed,
}

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load(path).with_context(|| format!("failed to load config {}", path.display()))
}

/// Link store and MFA feed, loaded once per run.
pub fn load_sources(config: &Config) -> anyhow::Result<Sources> {
    tracing::info!(
        "loading ASF<->GitHub links from {}",
        config.sources.link_db.display()
    );
    let links = LinkStore::open(&config.sources.link_db).with_context(|| {
        format!(
            "failed to read link store {}",
            config.sources.link_db.display()
        )
    })?;
    tracing::info!("found {} account links", links.len());

    tracing::info!("preloading MFA index from {}", config.sources.mfa_feed.display());
    let mfa = MfaFeed::load(&config.sources.mfa_feed).context("failed to load MFA feed")?;
    tracing::info!(
        "MFA index: {} enabled, {} disabled",
        mfa.enabled_count(),
        mfa.disabled_count()
    );
    Ok(Sources { links, mfa })
}

pub fn directory(config: &Config) -> GroupResolver {
    let backend = config
        .ldap
        .as_ref()
        .map(|l| Box::new(LdapBackend::new(l)) as Box<dyn DirectoryBackend>);
    GroupResolver::new(backend, config.ldap.as_ref(), config.groups.clone())
}

pub fn github(config: &Config) -> anyhow::Result<GitHubClient> {
    GitHubClient::new(&config.github).context("failed to build GitHub client")
}

pub fn local_repos(config: &Config) -> anyhow::Result<Option<BTreeSet<String>>> {
    let Some(dir) = config.sources.public_repos.as_deref() else {
        return Ok(None);
    };
    let repos = project::local_repos(dir)
        .with_context(|| format!("failed to list repos in {}", dir.display()))?;
    Ok(Some(repos))
}
