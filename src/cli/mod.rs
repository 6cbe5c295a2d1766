//! Command-line interface for repotrack.
//!
//! Provides commands for querying Pulp repository metadata, tracking builds,
//! and applying Koji task state changes to the build database.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::adapters::PulpClient;
use crate::config::{self, ResolvedConfig};
use crate::core::Dispatcher;
use crate::domain::{ArtifactType, Event, NewArtifactBuild, TaskStateEvent};
use crate::store::{BuildFilter, BuildStore, SqliteBuildStore};

/// repotrack - Pulp metadata client and Koji build-state tracker
#[derive(Parser, Debug)]
#[command(name = "repotrack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Build database (overrides configuration)
    #[arg(long, global = true, env = "REPOTRACK_DATABASE")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve content sets for repository ids (output keeps input order)
    ContentSets {
        /// Pulp repository ids
        #[arg(required = true)]
        repository_ids: Vec<String>,
    },

    /// Resolve the docker repository name published for a repository
    RepoName {
        /// Pulp repository id
        repository_id: String,
    },

    /// Start tracking a build
    Track {
        /// Build system task id
        build_id: String,

        /// Artifact type
        #[arg(short = 't', long = "type", value_enum, default_value = "image")]
        artifact_type: ArtifactKind,

        /// Artifact name (defaults to the build id)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Apply a Koji task state change
    TaskState {
        /// Koji task id
        task_id: String,

        /// New task state (e.g. CLOSED, FAILED)
        task_state: String,
    },

    /// List tracked builds
    Builds {
        /// Only show builds with this build id
        #[arg(short, long)]
        build_id: Option<String>,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Artifact type for CLI (maps to ArtifactType)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ArtifactKind {
    /// Container image
    Image,

    /// RPM package
    Rpm,

    /// Module
    Module,
}

impl From<ArtifactKind> for ArtifactType {
    fn from(kind: ArtifactKind) -> Self {
        match kind {
            ArtifactKind::Image => ArtifactType::Image,
            ArtifactKind::Rpm => ArtifactType::Rpm,
            ArtifactKind::Module => ArtifactType::Module,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let cfg = config::config()?;
        let database = self.database.unwrap_or_else(|| cfg.database.clone());

        match self.command {
            Commands::ContentSets { repository_ids } => show_content_sets(cfg, &repository_ids),
            Commands::RepoName { repository_id } => show_repo_name(cfg, &repository_id),
            Commands::Track {
                build_id,
                artifact_type,
                name,
            } => track_build(&database, build_id, artifact_type.into(), name),
            Commands::TaskState {
                task_id,
                task_state,
            } => apply_task_state(&database, TaskStateEvent::new(task_id, task_state)),
            Commands::Builds { build_id } => list_builds(&database, build_id),
            Commands::Config => show_config(cfg, &database),
        }
    }
}

fn pulp_client(cfg: &ResolvedConfig) -> Result<PulpClient> {
    PulpClient::from_settings(cfg.pulp()?).context("Failed to create Pulp client")
}

fn open_store(database: &Path) -> Result<SqliteBuildStore> {
    SqliteBuildStore::open(database)
        .with_context(|| format!("Failed to open build database: {}", database.display()))
}

fn show_content_sets(cfg: &ResolvedConfig, repository_ids: &[String]) -> Result<()> {
    let client = pulp_client(cfg)?;
    let content_sets = client
        .get_content_sets(repository_ids)
        .context("Failed to resolve content sets")?;

    for content_set in content_sets {
        println!("{}", content_set);
    }
    Ok(())
}

fn show_repo_name(cfg: &ResolvedConfig, repository_id: &str) -> Result<()> {
    let client = pulp_client(cfg)?;
    let name = client
        .get_docker_repository_name(repository_id)
        .with_context(|| format!("Failed to resolve docker repository for '{}'", repository_id))?;

    println!("{}", name);
    Ok(())
}

fn track_build(
    database: &Path,
    build_id: String,
    artifact_type: ArtifactType,
    name: Option<String>,
) -> Result<()> {
    let store = open_store(database)?;
    let name = name.unwrap_or_else(|| build_id.clone());
    let build = store
        .insert(&NewArtifactBuild::new(name, build_id, artifact_type))
        .context("Failed to record build")?;

    println!(
        "Tracking {} build {} (id {})",
        build.artifact_type, build.build_id, build.id
    );
    Ok(())
}

fn apply_task_state(database: &Path, event: TaskStateEvent) -> Result<()> {
    let store = open_store(database)?;
    let dispatcher = Dispatcher::with_default_handlers();
    let task_id = event.task_id.clone();

    let follow_ups = dispatcher
        .dispatch(&Event::from(event), &store)
        .with_context(|| format!("Failed to apply state change for task {}", task_id))?;

    let builds = store.find_builds(&BuildFilter::by_build(task_id.as_str(), ArtifactType::Image))?;
    match builds.first() {
        Some(build) => println!("Image build {} is {}", build.build_id, build.state),
        None => println!("No image build tracked for task {}", task_id),
    }
    if !follow_ups.is_empty() {
        println!("{} follow-up event(s) produced", follow_ups.len());
    }
    Ok(())
}

fn list_builds(database: &Path, build_id: Option<String>) -> Result<()> {
    let store = open_store(database)?;
    let filter = BuildFilter {
        build_id,
        artifact_type: None,
    };
    let builds = store.find_builds(&filter)?;

    if builds.is_empty() {
        println!("No builds tracked.");
        return Ok(());
    }

    println!(
        "{:<6} {:<12} {:<8} {:<10} {:<25} NAME",
        "ID", "BUILD", "TYPE", "STATE", "SUBMITTED"
    );
    println!("{}", "-".repeat(80));
    for build in builds {
        println!(
            "{:<6} {:<12} {:<8} {:<10} {:<25} {}",
            build.id,
            build.build_id,
            build.artifact_type,
            build.state,
            build.time_submitted.format("%Y-%m-%d %H:%M:%S UTC"),
            build.name
        );
    }
    Ok(())
}

fn show_config(cfg: &ResolvedConfig, database: &Path) -> Result<()> {
    println!("repotrack configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!("Database:    {}", database.display());
    println!();
    match cfg.pulp() {
        Ok(pulp) => {
            println!("Pulp:");
            println!("  Server:   {}", pulp.server_url);
            println!("  Username: {}", pulp.username);
            println!("  Password: ********");
            println!("  Timeout:  {}s", pulp.timeout_seconds);
            println!(
                "  Retry:    {} attempts, {}ms initial delay, x{} backoff (max {}ms)",
                pulp.retry.max_attempts,
                pulp.retry.initial_delay_ms,
                pulp.retry.backoff_multiplier,
                pulp.retry.max_delay_ms
            );
        }
        Err(e) => println!("Pulp: {}", e),
    }
    Ok(())
}
