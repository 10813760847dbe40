mod cmd;
mod context;
mod output;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Parser)]
#[command(
    name = "grouper",
    about = "Keep GitHub committer teams in step with ASF project groups",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file
    #[arg(long, global = true, env = "GROUPER_CONFIG", default_value = "grouper.yaml")]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Append log output to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every discovered project and publish the access map
    Run {
        /// Compute and log the plan without writing to GitHub
        #[arg(long)]
        dry_run: bool,

        /// Access map path (default: `output` from the config)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Reconcile a single project; the access map is left untouched
    Project {
        /// Project name, e.g. `httpd`
        name: String,

        /// Compute and log the plan without writing to GitHub
        #[arg(long)]
        dry_run: bool,
    },

    /// List projects discovered in the git directories
    Projects,

    /// Show link and MFA status for an ASF id
    Whois {
        asf_id: String,
    },

    /// Inspect the config
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn init_logging(level: tracing::Level, log_file: Option<&Path>) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_target(false);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow::anyhow!("cannot open log file {}: {e}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::Project { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    if let Err(e) = init_logging(default_level, cli.log_file.as_deref()) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }

    let config = cli.config.as_path();

    let result = match cli.command {
        Commands::Run { dry_run, output } => cmd::run::run(config, dry_run, output, cli.json),
        Commands::Project { name, dry_run } => {
            cmd::run::run_project(config, &name, dry_run, cli.json)
        }
        Commands::Projects => cmd::projects::run(config, cli.json),
        Commands::Whois { asf_id } => cmd::whois::run(config, &asf_id, cli.json),
        Commands::Config { subcommand } => cmd::config::run(config, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
