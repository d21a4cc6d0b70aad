//! Find command - Find versions matching a constraint.

use anyhow::Result;
use clap::Args;

use super::{parse_constraint, Context};

#[derive(Args)]
pub struct FindArgs {
    /// Template name
    name: String,

    /// Version constraint, e.g. "^1.0" or ">=1.2, <2" (any version if omitted)
    constraint: Option<String>,
}

pub async fn execute(args: FindArgs, ctx: &Context) -> Result<()> {
    let constraint = parse_constraint(args.constraint.as_deref())?;
    let (catalog, _) = ctx.open_catalog()?;
    let matches = catalog.find(&args.name, &constraint);

    if matches.is_empty() {
        println!("⚠️  No version of {} matches {}", args.name, constraint);
        return Ok(());
    }

    println!("🔎 {}@{} ({} match(es), most preferred first):", args.name, constraint, matches.len());
    for template in matches {
        println!(
            "   {:<20} {:<10} {}",
            template.version.to_string(),
            template.classification().as_str(),
            template.id.short()
        );
    }
    Ok(())
}
