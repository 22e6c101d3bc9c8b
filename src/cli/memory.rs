//! CLI commands for single-record operations: remember, recall, forget,
//! relate, link and timeline. Each prints its structured result as JSON.

use anyhow::Result;

use mnemograph::config::MnemographConfig;
use mnemograph::memory::parse_datetime;
use mnemograph::memory::types::Tier;

use super::{open_service, print_json};

pub async fn remember(
    config: &MnemographConfig,
    text: String,
    importance: Option<f64>,
    tier: Option<String>,
) -> Result<()> {
    let tier = tier.as_deref().map(str::parse::<Tier>).transpose()?;
    let service = open_service(config)?;
    let result = service.remember(text, importance, tier).await?;
    eprintln!(
        "Stored {} ({} entities, {} links{})",
        result.memory.id,
        result.memory.entities.len(),
        result.links.len(),
        if result.embedded { "" } else { ", keyword-only" }
    );
    print_json(&result)
}

pub async fn recall(config: &MnemographConfig, query: String, limit: Option<usize>) -> Result<()> {
    let service = open_service(config)?;
    let response = service.recall(query, limit).await?;
    service.settle().await;
    if response.keyword_fallback {
        eprintln!("Embeddings unavailable; ranked by keyword match.");
    }
    print_json(&response)
}

pub async fn forget(config: &MnemographConfig, id: String) -> Result<()> {
    let service = open_service(config)?;
    let result = service.forget(id).await?;
    if !result.changed {
        eprintln!("Memory {} was already forgotten.", result.id);
    }
    print_json(&result)
}

pub async fn relate(
    config: &MnemographConfig,
    source: String,
    target: String,
    relation: String,
    weight: Option<f64>,
) -> Result<()> {
    let service = open_service(config)?;
    let result = service.relate(source, target, relation, weight).await?;
    print_json(&result)
}

pub async fn link(config: &MnemographConfig, id: String) -> Result<()> {
    let service = open_service(config)?;
    let result = service.link(id).await?;
    eprintln!(
        "Compared against {} candidates, created {} edges.",
        result.candidates_considered,
        result.edges.len()
    );
    print_json(&result)
}

pub async fn timeline(
    config: &MnemographConfig,
    entity: Option<String>,
    since: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let since = since.as_deref().map(parse_datetime).transpose()?;
    let service = open_service(config)?;
    let response = service.timeline(entity, since, limit).await?;
    print_json(&response)
}
