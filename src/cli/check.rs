//! Check command - loads a catalog and prints a summary

use std::path::PathBuf;

use clap::Args;

use crate::domain::aop::WorkflowCatalog;
use crate::infrastructure::catalog::{default_catalog, CatalogFormat};

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Catalog file (`.json` or `.toml`); the built-in catalog when omitted
    #[arg(short, long)]
    pub path: Option<PathBuf>,
}

/// Parse the catalog strictly; unlike server start-up a missing file is an error
pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let (catalog, source) = match &args.path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path.display(), e))?;
            (
                CatalogFormat::from_path(path).parse(&content)?,
                path.display().to_string(),
            )
        }
        None => (default_catalog()?, "built-in catalog".to_string()),
    };

    print!("{}", summary(&catalog));
    println!("{}: OK", source);

    Ok(())
}

fn summary(catalog: &WorkflowCatalog) -> String {
    catalog
        .iter()
        .map(|workflow| {
            let inputs = workflow
                .steps()
                .iter()
                .filter(|step| step.requires_response())
                .count();

            format!(
                "{} ({} steps, {} inputs): {}\n",
                workflow.name(),
                workflow.steps().len(),
                inputs,
                workflow.description()
            )
        })
        .collect()
}
