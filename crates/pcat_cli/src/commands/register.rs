//! Register command - Register one template.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use tracing::info;

use pcat_catalog::{parse_manifest, RegistrationOutcome};

use super::{CliError, Context};

#[derive(Args)]
pub struct RegisterArgs {
    /// Path to the template manifest (YAML)
    manifest: PathBuf,

    /// Body file (defaults to the manifest's `body:` entry)
    #[arg(short, long)]
    body: Option<PathBuf>,
}

pub async fn execute(args: RegisterArgs, ctx: &Context) -> Result<()> {
    info!("Registering template from {:?}", args.manifest);

    let raw = std::fs::read_to_string(&args.manifest)
        .with_context(|| format!("Failed to read manifest {:?}", args.manifest))?;
    let manifest = parse_manifest(&raw)?;

    let body_path = match (&args.body, &manifest.body_path) {
        (Some(path), _) => path.clone(),
        (None, Some(relative)) => args
            .manifest
            .parent()
            .map(|dir| dir.join(relative))
            .unwrap_or_else(|| PathBuf::from(relative)),
        (None, None) => {
            return Err(CliError::InvalidArgs(
                "no body given: pass --body or set `body:` in the manifest".to_string(),
            )
            .into())
        }
    };
    let body = std::fs::read(&body_path)
        .with_context(|| format!("Failed to read template body {:?}", body_path))?;

    let (catalog, _) = ctx.open_catalog()?;
    let (id, outcome) = catalog.register_parsed(&body, &manifest)?;

    match outcome {
        RegistrationOutcome::Registered => {
            println!("✅ Registered {} as {}", manifest.label(), id.short())
        }
        RegistrationOutcome::MetadataUpdated => {
            println!("🔄 Updated metadata of {} ({})", manifest.label(), id.short())
        }
        RegistrationOutcome::Unchanged => {
            println!("✅ {} already registered ({})", manifest.label(), id.short())
        }
    }
    if !ctx.quiet {
        println!("   id: {}", id);
    }

    Ok(())
}
