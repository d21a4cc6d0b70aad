//! Show command - Show one template version.

use anyhow::Result;
use clap::Args;

use pcat_catalog::{parse_version, CatalogError, VersionConstraint};

use super::{CliError, Context, OutputFormat};

#[derive(Args)]
pub struct ShowArgs {
    /// Template name
    name: String,

    /// Exact version
    version: String,

    /// Print the full record instead of a summary
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
}

pub async fn execute(args: ShowArgs, ctx: &Context) -> Result<()> {
    let version = parse_version(&args.version).map_err(|e| CliError::InvalidArgs(e.to_string()))?;
    let (catalog, _) = ctx.open_catalog()?;

    let template = catalog
        .find(&args.name, &VersionConstraint::exact(&version))
        .into_iter()
        .find(|t| t.version == version)
        .ok_or_else(|| CatalogError::NotFound(format!("{}@{}", args.name, version)))?;

    if let Some(format) = args.format {
        println!("{}", format.render(&*template)?);
        return Ok(());
    }

    println!("📄 {}", template.reference());
    println!("   id:             {}", template.id);
    println!("   classification: {}", template.classification());
    println!("   registered:     {}", template.registered_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(author) = &template.metadata.author {
        println!("   author:         {}", author);
    }
    if let Some(description) = &template.metadata.description {
        println!("   description:    {}", description);
    }
    if !template.metadata.tags.is_empty() {
        println!("   tags:           {}", template.metadata.tags.join(", "));
    }

    let interface = &template.interface;
    if !interface.parameters.is_empty() {
        println!("\n   Parameters:");
        for param in &interface.parameters {
            let mut notes = Vec::new();
            if param.required {
                notes.push("required".to_string());
            }
            if let Some(default) = &param.default {
                notes.push(format!("default {}", default));
            }
            if let Some(source) = &param.source {
                notes.push(format!("from {}", source));
            }
            println!("     - {}: {} {}", param.name, param.param_type, notes.join(", "));
        }
    }
    if !interface.outputs.is_empty() {
        println!("\n   Outputs:");
        for output in &interface.outputs {
            println!("     - {}: {}", output.name, output.output_type);
        }
    }
    if !interface.dependencies.is_empty() {
        println!("\n   Dependencies:");
        for dep in &interface.dependencies {
            println!("     - {}", dep);
        }
    }
    Ok(())
}
