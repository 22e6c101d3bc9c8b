//! CLI maintenance commands: `reflect` and `purge`.

use anyhow::Result;

use mnemograph::config::MnemographConfig;

use super::{open_service, print_json};

/// Run one reflection cycle and print the report.
pub async fn reflect(
    config: &MnemographConfig,
    prune_days: Option<u64>,
    similarity_threshold: Option<f64>,
) -> Result<()> {
    let service = open_service(config)?;
    let report = service.reflect(prune_days, similarity_threshold).await?;

    eprintln!("Reflection complete:");
    eprintln!("  Pruned:               {}", report.pruned);
    eprintln!("  Duplicate pairs:      {}", report.duplicates.len());
    eprintln!("  Promoted to semantic: {}", report.promoted);
    eprintln!("  Orphan edges removed: {}", report.orphan_edges_removed);
    for failure in &report.errors {
        eprintln!("  FAILED {}: {}", failure.step.as_str(), failure.message);
    }

    print_json(&report)
}

/// Permanently delete memories that decayed more than `older_than_days` ago.
pub async fn purge(config: &MnemographConfig, older_than_days: u64, confirm: bool) -> Result<()> {
    if !confirm {
        anyhow::bail!("purge permanently deletes decayed memories; re-run with --confirm");
    }
    let service = open_service(config)?;
    let report = service.purge(older_than_days).await?;
    eprintln!("Purged {} decayed memories.", report.purged);
    print_json(&report)
}
