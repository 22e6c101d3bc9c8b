use anyhow::Result;

use mnemograph::config::MnemographConfig;

use super::{open_service, print_json};

/// Print store statistics. Does not load the embedding model.
pub async fn stats(config: &MnemographConfig) -> Result<()> {
    let service = open_service(config)?;
    let response = service.stats().await?;
    print_json(&response)
}
