//! bundlegraph - dependency resolution and permutation planning CLI
//!
//! ## Commands
//!
//! - `build`: plan the kernel and every artifact for every permutation
//! - `permutations`: list permutation checksums and field assignments
//! - `resolve`: print the load order of an ad-hoc seed set
//! - `clean`: clear the resolution cache

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};

use bundlegraph_core::{
    BuildConfig, Builder, FailurePolicy, FieldValue, PlanFileSink, Session, SessionSpan,
    CONFIG_FILE,
};

#[derive(Parser)]
#[command(name = "bundlegraph")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resolve, order and permute classes into deployable bundles", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Build configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan the kernel and every artifact for every permutation
    Build {
        /// Output directory for plan files
        #[arg(short, long, default_value = "build")]
        out: PathBuf,

        /// Keep building other permutations when one fails
        #[arg(long)]
        keep_going: bool,

        /// Worker count (default: from config, else one per core)
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// List permutations with their checksums
    Permutations,

    /// Print the load order of a seed set
    Resolve {
        /// Seed class (repeatable)
        #[arg(short, long = "seed", required = true)]
        seeds: Vec<String>,

        /// Class to leave out (repeatable)
        #[arg(short = 'x', long = "exclude")]
        excluded: Vec<String>,

        /// Pin a field, as `name=value` (repeatable)
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, FieldValue)>,

        /// Extra project manifest (repeatable)
        #[arg(short, long = "project")]
        projects: Vec<PathBuf>,
    },

    /// Clear the resolution cache
    Clean,
}

fn parse_field(raw: &str) -> std::result::Result<(String, FieldValue), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty field name in {raw:?}"));
    }
    Ok((name.to_string(), FieldValue::parse(value.trim())))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    bundlegraph_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Build {
            out,
            keep_going,
            jobs,
        } => cmd_build(&cli.config, &out, keep_going, jobs).await,
        Commands::Permutations => cmd_permutations(&cli.config),
        Commands::Resolve {
            seeds,
            excluded,
            fields,
            projects,
        } => cmd_resolve(&cli.config, &seeds, &excluded, &fields, &projects),
        Commands::Clean => cmd_clean(&cli.config),
    }
}

fn load_config(path: &Path) -> Result<BuildConfig> {
    BuildConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))
}

fn open_session(config: &BuildConfig) -> Result<Session> {
    config
        .open_session()
        .context("Failed to open build session")
}

fn session_tag(session: &Session) -> String {
    session.database().identity()[..8].to_string()
}

/// Plan every artifact and write one plan file per artifact and permutation.
async fn cmd_build(
    config_path: &Path,
    out: &Path,
    keep_going: bool,
    jobs: Option<usize>,
) -> Result<()> {
    let config = load_config(config_path)?;
    if config.artifacts.is_empty() && config.kernel.is_none() {
        bail!("{} declares no kernel and no artifacts", config_path.display());
    }

    let policy = if keep_going {
        FailurePolicy::Continue
    } else {
        FailurePolicy::FailFast
    };
    let builder = Builder::new(jobs.unwrap_or_else(|| config.jobs())).with_policy(policy);
    let sink = PlanFileSink::new(out);

    let mut session = open_session(&config)?;
    let result = {
        let _span = SessionSpan::enter(&session_tag(&session));
        info!(jobs = builder.jobs(), out = %out.display(), "starting build");
        builder
            .build(&mut session, config.kernel.as_ref(), &config.artifacts, &sink)
            .await
    };
    session.close();
    let report = result.context("Build failed")?;

    let summary = report.summary();
    std::fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;
    let summary_path = out.join("report.json");
    std::fs::write(&summary_path, serde_json::to_vec_pretty(&summary)?)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    if let Some(kernel) = &summary.kernel {
        println!("kernel    {kernel}");
    }
    for artifact in &summary.artifacts {
        for file in &artifact.built {
            println!("built     {file}");
        }
        for failed in &artifact.failed {
            println!("FAILED    {}-{}: {}", artifact.artifact, failed.checksum, failed.error);
        }
    }
    println!("Report:   {}", summary_path.display());

    match report.failure_count() {
        0 => Ok(()),
        n => Err(anyhow!("{n} permutation(s) failed")),
    }
}

/// List every permutation of the configured fields.
fn cmd_permutations(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let mut session = open_session(&config)?;
    let result = list_permutations(&mut session);
    session.close();
    result
}

fn list_permutations(session: &mut Session) -> Result<()> {
    let _span = SessionSpan::enter(&session_tag(session));
    let permutations = session.permutations()?;
    for permutation in permutations {
        println!("{}  {}", permutation.checksum(), permutation);
    }
    println!("{} permutation(s)", permutations.len());
    Ok(())
}

/// Resolve an ad-hoc seed set under the fixed-only permutation.
fn cmd_resolve(
    config_path: &Path,
    seeds: &[String],
    excluded: &[String],
    fields: &[(String, FieldValue)],
    extra_projects: &[PathBuf],
) -> Result<()> {
    let mut config = if config_path.exists() || extra_projects.is_empty() {
        load_config(config_path)?
    } else {
        BuildConfig::default()
    };
    // Nothing is enumerated; unpinned fields take their defaults.
    config.permutate.clear();
    for (name, value) in fields {
        config.fields.insert(name.clone(), value.clone());
    }
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    config
        .projects
        .extend(extra_projects.iter().map(|p| cwd.join(p)));

    let session = open_session(&config)?;
    let seeds: BTreeSet<String> = seeds.iter().cloned().collect();
    let excluded: BTreeSet<String> = excluded.iter().cloned().collect();
    let result = print_load_order(&session, &seeds, &excluded);
    session.close();
    result
}

fn print_load_order(
    session: &Session,
    seeds: &BTreeSet<String>,
    excluded: &BTreeSet<String>,
) -> Result<()> {
    let _span = SessionSpan::enter(&session_tag(session));
    let permutation = session.fixed_permutation()?;
    let resolved = session.resolve(Some(&permutation), seeds, excluded)?;

    for class in &resolved.sorted {
        println!("{class}");
    }
    for gap in &resolved.unsatisfied {
        warn!(
            class = %gap.class,
            dependency = %gap.dependency,
            "dependency left to an earlier artifact"
        );
    }
    info!(
        checksum = %permutation.checksum(),
        classes = resolved.sorted.len(),
        "resolved"
    );
    Ok(())
}

/// Clear the configured cache.
fn cmd_clean(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let session = Session::with_cache(config.cache());
    session.clear_cache();
    match config.cache_path() {
        Some(path) => println!("Cleared cache at {}", path.display()),
        None => println!("No cache_dir configured; nothing persisted to clear"),
    }
    session.close();
    Ok(())
}
