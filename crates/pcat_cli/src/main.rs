//! pcat CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Validation failure
//! - 4: Resolution failure
//! - 5: Drift detected

use std::process::ExitCode;

use clap::Parser;
use pcat_catalog::CatalogError;
use pcat_drift::DriftError;
use pcat_resolver::{ComposeError, PlanError, ResolveError};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, CliError, Commands, Context};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const RESOLUTION_FAILURE: u8 = 4;
    pub const DRIFT_DETECTED: u8 = 5;
}

fn init_logging(cli: &Cli) {
    let default_filter = if cli.verbose {
        "pcat=debug,info"
    } else if cli.quiet {
        "warn"
    } else {
        "pcat=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(filter);
    let log_result = if cli.log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);
    let ctx = Context::from_cli(&cli);

    let result = match cli.command {
        Commands::Register(args) => commands::register::execute(args, &ctx).await,
        Commands::Load(args) => commands::load::execute(args, &ctx).await,
        Commands::List(args) => commands::list::execute(args, &ctx).await,
        Commands::Find(args) => commands::find::execute(args, &ctx).await,
        Commands::Search(args) => commands::search::execute(args, &ctx).await,
        Commands::Show(args) => commands::show::execute(args, &ctx).await,
        Commands::Plan(args) => commands::plan::execute(args, &ctx).await,
        Commands::Drift(args) => commands::drift::execute(args, &ctx).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            if exit_code == ExitCodes::DRIFT_DETECTED {
                eprintln!("🔀 {:#}", e);
            } else {
                eprintln!("❌ Error: {:#}", e);
            }
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<CliError>() {
            return match err {
                CliError::InvalidArgs(_) => ExitCodes::INVALID_ARGS,
                CliError::Validation(_) => ExitCodes::VALIDATION_FAILURE,
                CliError::DriftDetected(_) => ExitCodes::DRIFT_DETECTED,
            };
        }
        if let Some(err) = cause.downcast_ref::<CatalogError>() {
            return catalog_exit_code(err);
        }
        if let Some(err) = cause.downcast_ref::<ComposeError>() {
            return match err {
                ComposeError::Resolve(e) => resolve_exit_code(e),
                ComposeError::Plan(e) => plan_exit_code(e),
            };
        }
        if let Some(err) = cause.downcast_ref::<ResolveError>() {
            return resolve_exit_code(err);
        }
        if let Some(err) = cause.downcast_ref::<PlanError>() {
            return plan_exit_code(err);
        }
        if let Some(DriftError::IncompatibleSnapshot(_)) = cause.downcast_ref::<DriftError>() {
            return ExitCodes::VALIDATION_FAILURE;
        }
    }
    ExitCodes::GENERAL_ERROR
}

fn catalog_exit_code(err: &CatalogError) -> u8 {
    match err {
        CatalogError::MalformedInterface { .. } | CatalogError::Conflict { .. } => {
            ExitCodes::VALIDATION_FAILURE
        }
        CatalogError::InvalidVersion { .. }
        | CatalogError::InvalidConstraint { .. }
        | CatalogError::NotFound(_) => ExitCodes::INVALID_ARGS,
        _ => ExitCodes::GENERAL_ERROR,
    }
}

fn resolve_exit_code(err: &ResolveError) -> u8 {
    match err {
        ResolveError::Catalog(e) => catalog_exit_code(e),
        _ => ExitCodes::RESOLUTION_FAILURE,
    }
}

fn plan_exit_code(err: &PlanError) -> u8 {
    match err {
        PlanError::InvalidOverride(_) => ExitCodes::INVALID_ARGS,
        _ => ExitCodes::RESOLUTION_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_error_type() {
        let drift = anyhow::Error::from(CliError::DriftDetected("1 added".into()));
        assert_eq!(categorize_error(&drift), ExitCodes::DRIFT_DETECTED);

        let cycle = anyhow::Error::from(ComposeError::Resolve(ResolveError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        }));
        assert_eq!(categorize_error(&cycle), ExitCodes::RESOLUTION_FAILURE);

        let malformed = anyhow::Error::from(CatalogError::MalformedInterface {
            template: "app".into(),
            problems: vec![],
        })
        .context("Failed to register");
        assert_eq!(categorize_error(&malformed), ExitCodes::VALIDATION_FAILURE);

        let io = anyhow::Error::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(categorize_error(&io), ExitCodes::GENERAL_ERROR);
    }
}
