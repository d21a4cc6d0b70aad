//! Load command - Register every template under a directory.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use pcat_catalog::CatalogLoader;

use super::{CliError, Context};

#[derive(Args)]
pub struct LoadArgs {
    /// Directory containing template directories (each with a template.yaml)
    dir: PathBuf,
}

pub async fn execute(args: LoadArgs, ctx: &Context) -> Result<()> {
    info!("Loading templates from {:?}", args.dir);

    if !args.dir.is_dir() {
        return Err(CliError::InvalidArgs(format!("Templates directory not found: {:?}", args.dir)).into());
    }

    let (catalog, _) = ctx.open_catalog()?;
    let report = CatalogLoader::new(&args.dir).load_into(&catalog)?;

    if report.total() == 0 {
        println!("⚠️  No templates found in {:?}", args.dir);
        return Ok(());
    }

    println!("📦 Loaded templates from {:?}", args.dir);
    println!("   ✅ {} registered", report.registered.len());
    println!("   ➖ {} unchanged", report.unchanged.len());

    if !report.is_clean() {
        println!("   ❌ {} failed:", report.failures.len());
        for (path, reason) in &report.failures {
            println!("      - {}: {}", path.display(), reason);
        }
        return Err(CliError::Validation(format!(
            "{} template(s) could not be registered",
            report.failures.len()
        ))
        .into());
    }

    Ok(())
}
