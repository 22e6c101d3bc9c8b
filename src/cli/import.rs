use std::path::Path;

use anyhow::{Context, Result};

use mnemograph::config::MnemographConfig;
use mnemograph::memory::export::ExportDocument;
use mnemograph::memory::types::Tier;

use super::{open_service, print_json, read_input};

/// Import a text file (or stdin) as chunked memories.
///
/// With `from_export`, the input is an `export` document instead: memories
/// are re-remembered (fresh ids and embeddings) and explicit edges replayed.
pub async fn import(
    config: &MnemographConfig,
    file: &Path,
    tier: Option<String>,
    from_export: bool,
) -> Result<()> {
    let input = read_input(file)?;
    let service = open_service(config)?;

    if from_export {
        let document: ExportDocument =
            serde_json::from_str(&input).context("failed to parse export JSON")?;
        eprintln!(
            "Restoring {} memories and {} edges...",
            document.memories.len(),
            document.edges.len()
        );
        let report = service.restore(document).await?;
        return print_json(&report);
    }

    let tier = tier.as_deref().map(str::parse::<Tier>).transpose()?;
    let report = service.import_bulk(input, tier).await?;

    eprintln!("Import complete:");
    eprintln!("  Chunks:        {}", report.chunks);
    eprintln!("  Stored:        {}", report.stored);
    if report.keyword_only > 0 {
        eprintln!("  Keyword-only:  {}", report.keyword_only);
    }
    eprintln!("  Links created: {}", report.links_created);
    for failure in &report.failures {
        eprintln!("  Warning: chunk {} failed: {}", failure.chunk, failure.error);
    }

    print_json(&report)
}
