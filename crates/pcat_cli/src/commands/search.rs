//! Search command - Search by tag or free text.

use anyhow::Result;
use clap::Args;

use pcat_catalog::{Classification, SearchQuery};

use super::{CliError, Context};

#[derive(Args)]
pub struct SearchArgs {
    /// Search text; `*` and `?` match template names as a glob
    pub query: String,

    /// Treat the query as an exact tag
    #[arg(long)]
    pub tag: bool,

    /// Only include templates of this classification (certified, community, starter)
    #[arg(short, long)]
    pub classification: Option<String>,
}

pub async fn execute(args: SearchArgs, ctx: &Context) -> Result<()> {
    let mut query = if args.tag {
        SearchQuery::tag(&args.query)
    } else {
        SearchQuery::text(&args.query)
    };
    if let Some(raw) = &args.classification {
        let classification = Classification::from_str(raw)
            .ok_or_else(|| CliError::InvalidArgs(format!("unknown classification '{}'", raw)))?;
        query = query.with_classification(classification);
    }

    let (catalog, _) = ctx.open_catalog()?;
    let snapshot = catalog.snapshot();
    let hits = snapshot.search(&query);

    if hits.is_empty() {
        println!("⚠️  Nothing matches '{}'", args.query);
        return Ok(());
    }

    println!("🔎 {} result(s):", hits.len());
    for id in hits {
        if let Some(template) = snapshot.get(&id) {
            let description = template.metadata.description.as_deref().unwrap_or("");
            println!(
                "   {:<32} {:<10} {}",
                template.reference().to_string(),
                template.classification().as_str(),
                description
            );
        }
    }
    Ok(())
}
