//! CLI command definitions.
//!
//! Each subcommand lives in its own module with an `XxxArgs` struct and an
//! async `execute` function.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pcat_catalog::{Catalog, CatalogConfig, VersionConstraint};
use pcat_resolver::CancellationToken;
use thiserror::Error;
use tracing::debug;

pub mod drift;
pub mod find;
pub mod list;
pub mod load;
pub mod plan;
pub mod register;
pub mod search;
pub mod show;

/// pcat - pattern catalog and composition engine
#[derive(Parser)]
#[command(name = "pcat")]
#[command(version, about = "pcat - pattern catalog and composition engine")]
#[command(long_about = r#"
pcat stores versioned infrastructure templates, resolves their dependencies
into a deployable composition plan, and reports drift between a plan and
what is actually deployed.

COMMANDS:
  register  → Register one template manifest
  load      → Register every template under a directory
  list      → List template names or the versions of one name
  find      → Find versions matching a constraint
  search    → Search by tag or text
  show      → Show one template version
  plan      → Resolve and plan a composition
  drift     → Compare a deployed snapshot with a fresh plan

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Validation failure
  4 - Resolution failure
  5 - Drift detected
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Catalog storage directory (overrides the config file)
    #[arg(long, global = true, env = "PCAT_CATALOG_DIR")]
    pub catalog_dir: Option<PathBuf>,

    /// Configuration file (.yaml, .yml or .toml)
    #[arg(long, global = true, env = "PCAT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a template manifest and its body
    Register(register::RegisterArgs),

    /// Register every template found under a directory
    Load(load::LoadArgs),

    /// List template names, or the versions of one template
    List(list::ListArgs),

    /// Find template versions matching a constraint
    Find(find::FindArgs),

    /// Search templates by tag or free text
    Search(search::SearchArgs),

    /// Show one template version in detail
    Show(show::ShowArgs),

    /// Resolve dependencies and produce a composition plan
    Plan(plan::PlanArgs),

    /// Compare a deployed state snapshot with a fresh plan
    Drift(drift::DriftArgs),
}

/// Failures the CLI raises itself, mapped to dedicated exit codes.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Drift detected: {0}")]
    DriftDetected(String),
}

/// Serialization format for machine-readable output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn render<T: serde::Serialize>(&self, value: &T) -> Result<String> {
        Ok(match self {
            OutputFormat::Json => serde_json::to_string_pretty(value)?,
            OutputFormat::Yaml => serde_yaml::to_string(value)?,
        })
    }
}

/// Global options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub catalog_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub quiet: bool,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            catalog_dir: cli.catalog_dir.clone(),
            config: cli.config.clone(),
            quiet: cli.quiet,
        }
    }

    /// Configuration from the config file, with command-line overrides.
    pub fn load_config(&self) -> Result<CatalogConfig> {
        let config = match &self.config {
            Some(path) => CatalogConfig::load(path)
                .with_context(|| format!("Failed to load config from {:?}", path))?,
            None => CatalogConfig::default(),
        };
        Ok(match &self.catalog_dir {
            Some(dir) => config.with_storage_path(dir),
            None => config,
        })
    }

    pub fn open_catalog(&self) -> Result<(Catalog, CatalogConfig)> {
        let config = self.load_config()?;
        debug!("Opening catalog with {:?}", config.storage);
        let backend = config.open_backend().context("Failed to open catalog storage")?;
        let catalog = Catalog::open(backend).context("Failed to open catalog")?;
        Ok((catalog, config))
    }
}

/// Parse an optional constraint argument; absent means any version.
pub fn parse_constraint(raw: Option<&str>) -> Result<VersionConstraint> {
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|e: pcat_catalog::CatalogError| CliError::InvalidArgs(e.to_string()).into()),
        None => Ok(VersionConstraint::any()),
    }
}

/// Token cancelled when the user presses Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
    token
}
