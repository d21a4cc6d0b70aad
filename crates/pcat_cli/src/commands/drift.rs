//! Drift command - Compare a deployed snapshot with a fresh plan.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use tracing::info;

use pcat_drift::{diff, DeployedStateSnapshot};

use super::{plan::compose, CliError, Context, OutputFormat};

#[derive(Args)]
pub struct DriftArgs {
    /// Deployed state snapshot (JSON, or YAML by extension)
    snapshot: PathBuf,

    /// Root template name
    name: String,

    /// Version constraint for the root (any version if omitted)
    constraint: Option<String>,

    /// Parameter override as `template.param=value` or `param=value` for the root
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Print the report in a machine-readable format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,
}

pub async fn execute(args: DriftArgs, ctx: &Context) -> Result<()> {
    info!("Checking drift of {} against {:?}", args.name, args.snapshot);

    let snapshot = DeployedStateSnapshot::load(&args.snapshot)
        .with_context(|| format!("Failed to load snapshot {:?}", args.snapshot))?;
    let plan = compose(ctx, &args.name, args.constraint.as_deref(), &args.set).await?;
    let report = diff(&snapshot, &plan)?;

    match args.format {
        Some(format) => println!("{}", format.render(&report)?),
        None if report.is_clean() => println!("✅ No drift: deployment matches the plan"),
        None => {
            println!("🔀 Drift for {}:", report.root);
            for entry in &report.entries {
                println!("   {}", entry);
            }
        }
    }

    if !report.is_clean() {
        return Err(CliError::DriftDetected(report.summary()).into());
    }
    Ok(())
}
