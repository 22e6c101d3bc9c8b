//! Write path: entities and importance → stored record → auto-linked edges.
//!
//! The embedding is computed by the caller (it may be slow or unavailable) and
//! handed in; a `None` stores a keyword-only record.

use rusqlite::Connection;
use serde::Serialize;

use super::entities::EntityExtractor;
use super::graph::{self, LinkOptions};
use super::store;
use super::truncate_preview;
use super::types::{Edge, Memory, NewMemory, Tier};
use crate::error::{MemoryError, Result};

/// Result returned from a remember operation.
#[derive(Debug, Serialize)]
pub struct RememberResult {
    pub memory: Memory,
    /// `false` when the record was stored without an embedding.
    pub embedded: bool,
    /// Edges created by the linker for this record.
    pub links: Vec<Edge>,
}

/// Heuristic importance from content length and entity density, in `[0.1, 1.0]`.
///
/// Short notes without entities land below the default prune threshold.
pub fn estimate_importance(text: &str, entity_count: usize) -> f64 {
    let length = (text.chars().count() as f64 / 400.0).min(1.0);
    let density = (entity_count as f64 / 5.0).min(1.0);
    (0.1 + 0.4 * length + 0.5 * density).clamp(0.0, 1.0)
}

/// Store `text` and link it into the graph.
///
/// A linker failure is logged and leaves the record stored without edges.
pub fn remember(
    conn: &mut Connection,
    text: &str,
    importance: Option<f64>,
    tier: Option<Tier>,
    embedding: Option<Vec<f32>>,
    extractor: &EntityExtractor,
    link_options: &LinkOptions,
) -> Result<RememberResult> {
    let text = text.trim();
    if text.is_empty() {
        return Err(MemoryError::invalid("text must not be empty"));
    }
    if let Some(value) = importance {
        if !(0.0..=1.0).contains(&value) {
            return Err(MemoryError::invalid(format!(
                "importance must be within [0, 1], got {value}"
            )));
        }
    }

    let entities = extractor.extract(text);
    let importance = importance.unwrap_or_else(|| estimate_importance(text, entities.len()));
    let embedded = embedding.is_some();

    let memory = store::insert(
        conn,
        NewMemory {
            text: text.to_string(),
            embedding,
            tier: tier.unwrap_or_default(),
            importance,
            entities,
            ..NewMemory::default()
        },
    )?;

    let links = match graph::auto_link(conn, &memory, link_options) {
        Ok(result) => result.edges,
        Err(e) => {
            tracing::warn!(id = %memory.id, error = %e, "auto-linking failed, memory stored without edges");
            Vec::new()
        }
    };

    tracing::info!(
        id = %memory.id,
        preview = %truncate_preview(&memory.text, 60),
        entities = memory.entities.len(),
        links = links.len(),
        embedded,
        "memory remembered"
    );

    Ok(RememberResult {
        memory,
        embedded,
        links,
    })
}
