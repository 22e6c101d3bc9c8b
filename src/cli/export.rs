use std::path::Path;

use anyhow::{Context, Result};

use mnemograph::config::MnemographConfig;

use super::{open_service, print_json};

/// Export live memories and edges as JSON, to `output` or stdout.
pub async fn export(config: &MnemographConfig, output: Option<&Path>) -> Result<()> {
    let service = open_service(config)?;
    let document = service.export().await?;

    match output {
        Some(path) => {
            let json = serde_json::to_string_pretty(&document)?;
            std::fs::write(path, json)
                .with_context(|| format!("failed to write export to {}", path.display()))?;
            eprintln!("Export written to {}", path.display());
        }
        None => print_json(&document)?,
    }

    eprintln!(
        "Exported {} memories and {} edges.",
        document.memories.len(),
        document.edges.len()
    );
    Ok(())
}
