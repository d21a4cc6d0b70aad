//! Plan command - Resolve dependencies and produce a composition plan.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use tracing::info;

use pcat_resolver::{CompositionPlan, CompositionService, ParameterOverrides};

use super::{cancel_on_ctrl_c, parse_constraint, CliError, Context, OutputFormat};

#[derive(Args)]
pub struct PlanArgs {
    /// Root template name
    pub name: String,

    /// Version constraint for the root (any version if omitted)
    pub constraint: Option<String>,

    /// Parameter override as `template.param=value` or `param=value` for the root
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Write the plan to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Resolve and plan `name` on a blocking thread.
pub async fn compose(
    ctx: &Context,
    name: &str,
    constraint: Option<&str>,
    set: &[String],
) -> Result<CompositionPlan> {
    let constraint = parse_constraint(constraint)?;
    let overrides = ParameterOverrides::parse_assignments(set)
        .map_err(|e| CliError::InvalidArgs(e.to_string()))?;

    let (catalog, config) = ctx.open_catalog()?;
    let service = CompositionService::new(catalog, &config.resolver);
    let cancel = cancel_on_ctrl_c();
    let name = name.to_string();

    let plan = tokio::task::spawn_blocking(move || {
        service.compose(&name, &constraint, &overrides, &cancel)
    })
    .await
    .context("Composition task failed")??;

    for warning in &plan.warnings {
        eprintln!("⚠️  {}", warning);
    }
    Ok(plan)
}

pub async fn execute(args: PlanArgs, ctx: &Context) -> Result<()> {
    info!("Planning {}", args.name);

    let plan = compose(ctx, &args.name, args.constraint.as_deref(), &args.set).await?;
    let rendered = args.format.render(&plan)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write plan to {:?}", path))?;
            if !ctx.quiet {
                println!("✅ Plan {} written to {:?}", plan.id, path);
                for (i, step) in plan.steps.iter().enumerate() {
                    println!("   {}. {}@{}", i + 1, step.name, step.version);
                }
            }
        }
        None => println!("{}", rendered),
    }

    Ok(())
}
