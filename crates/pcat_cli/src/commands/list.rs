//! List command - List template names or versions.

use anyhow::Result;
use clap::Args;

use super::Context;

#[derive(Args)]
pub struct ListArgs {
    /// Template name (lists every name if omitted)
    name: Option<String>,
}

pub async fn execute(args: ListArgs, ctx: &Context) -> Result<()> {
    let (catalog, _) = ctx.open_catalog()?;
    let snapshot = catalog.snapshot();

    match &args.name {
        None => {
            let names = snapshot.names();
            if names.is_empty() {
                println!("⚠️  Catalog is empty");
                return Ok(());
            }
            println!("📚 {} template(s):", names.len());
            for name in names {
                let versions = snapshot.versions(name);
                let latest = versions
                    .first()
                    .map(|t| t.version.to_string())
                    .unwrap_or_default();
                println!("   {:<32} {:>3} version(s), latest {}", name, versions.len(), latest);
            }
        }
        Some(name) => {
            let versions = catalog.store().list(name)?;
            if versions.is_empty() {
                println!("⚠️  No versions of {} registered", name);
                return Ok(());
            }
            println!("📚 {}:", name);
            for version in versions {
                let entries: Vec<_> = snapshot
                    .versions(name)
                    .into_iter()
                    .filter(|t| t.version == version)
                    .collect();
                match entries.first() {
                    Some(t) => println!(
                        "   {:<20} {:<10} {}",
                        version.to_string(),
                        t.classification().as_str(),
                        t.id.short()
                    ),
                    None => println!("   {:<20} (not indexed)", version.to_string()),
                }
            }
        }
    }

    Ok(())
}
