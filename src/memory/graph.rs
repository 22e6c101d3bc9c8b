//! Knowledge graph: automatic and explicit edges between memories.
//!
//! On every write, [`auto_link`] compares the new record against a bounded
//! candidate set (the most recent records, its nearest vector neighbours and
//! records sharing an entity) and stores a directionless `relates_to` edge
//! when entity overlap and, where both sides are embedded, vector similarity
//! clear their thresholds. [`relate`] adds caller-asserted edges.

use std::collections::HashSet;
use std::ops::ControlFlow;

use rusqlite::{params, Connection};
use serde::Serialize;

use super::entities::normalize_entity;
use super::store::{self, ScanFilter};
use super::types::{Direction, Edge, EdgeOrigin, Memory, NewEdge, Relation};
use super::{cosine_similarity, embedding_to_bytes};
use crate::config::LinkingConfig;
use crate::error::{MemoryError, Result};

/// Thresholds and candidate bounds for [`auto_link`].
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// How many of the most recent records to compare against.
    pub candidate_limit: usize,
    /// How many nearest vector neighbours to add to the candidates.
    pub similar_candidates: usize,
    /// Minimum overlap coefficient of entity sets.
    pub min_overlap: f64,
    /// Minimum cosine similarity, applied only when both records are embedded.
    pub min_similarity: f64,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self::from(&LinkingConfig::default())
    }
}

impl From<&LinkingConfig> for LinkOptions {
    fn from(config: &LinkingConfig) -> Self {
        Self {
            candidate_limit: config.candidate_limit,
            similar_candidates: config.similar_candidates,
            min_overlap: config.min_overlap,
            min_similarity: config.min_similarity,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LinkResult {
    pub memory_id: String,
    pub candidates_considered: usize,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Serialize)]
pub struct RelateResult {
    pub edge: Edge,
    /// `true` if this `(source, target, relation)` edge already existed and was updated.
    pub deduplicated: bool,
}

/// A live memory reached over one edge.
#[derive(Debug, Clone, Serialize)]
pub struct Neighbor {
    pub edge: Edge,
    pub memory: Memory,
}

/// Overlap coefficient of two entity lists: shared / min(|a|, |b|), case-insensitive.
pub fn entity_overlap(a: &[String], b: &[String]) -> (usize, f64) {
    let left: HashSet<String> = a.iter().map(|e| normalize_entity(e)).collect();
    let right: HashSet<String> = b.iter().map(|e| normalize_entity(e)).collect();
    let smaller = left.len().min(right.len());
    if smaller == 0 {
        return (0, 0.0);
    }
    let shared = left.intersection(&right).count();
    (shared, shared as f64 / smaller as f64)
}

/// Link `memory` to existing records that share entities with it.
///
/// Creates at most one `relates_to` edge per pair (new → existing) and never
/// touches edges that already connect the pair.
pub fn auto_link(conn: &mut Connection, memory: &Memory, options: &LinkOptions) -> Result<LinkResult> {
    let mut result = LinkResult {
        memory_id: memory.id.clone(),
        candidates_considered: 0,
        edges: Vec::new(),
    };
    if memory.entities.is_empty() || memory.decayed {
        return Ok(result);
    }

    let candidates = gather_candidates(conn, memory, options)?;
    result.candidates_considered = candidates.len();

    for candidate in candidates {
        let (shared, overlap) = entity_overlap(&memory.entities, &candidate.entities);
        if shared == 0 || overlap < options.min_overlap {
            continue;
        }

        let similarity = match (&memory.embedding, &candidate.embedding) {
            (Some(a), Some(b)) => Some(cosine_similarity(a, b)),
            _ => None,
        };
        if matches!(similarity, Some(s) if s < options.min_similarity) {
            continue;
        }

        if pair_is_linked(conn, &memory.id, &candidate.id)? {
            continue;
        }

        let weight = match similarity {
            Some(s) => (overlap + s) / 2.0,
            None => overlap,
        }
        .clamp(0.0, 1.0);

        let edge = store::insert_edge(
            conn,
            NewEdge {
                source_id: memory.id.clone(),
                target_id: candidate.id.clone(),
                relation: Relation::RelatesTo,
                weight,
                origin: EdgeOrigin::Auto,
            },
        )?;
        tracing::debug!(
            source = %edge.source_id,
            target = %edge.target_id,
            weight,
            shared,
            "auto-linked"
        );
        result.edges.push(edge);
    }

    Ok(result)
}

/// Re-run the linker for an existing record.
pub fn link_memory(conn: &mut Connection, id: &str, options: &LinkOptions) -> Result<LinkResult> {
    let memory = store::get(conn, id)?;
    if memory.decayed {
        return Err(MemoryError::invalid(format!("memory {id} is decayed")));
    }
    auto_link(conn, &memory, options)
}

/// Recent records, nearest vector neighbours and entity-sharing records, deduplicated.
fn gather_candidates(conn: &Connection, memory: &Memory, options: &LinkOptions) -> Result<Vec<Memory>> {
    let mut seen: HashSet<String> = HashSet::from([memory.id.clone()]);
    let mut candidates = Vec::new();

    let recent = ScanFilter {
        newest_first: true,
        limit: Some(options.candidate_limit + 1),
        ..ScanFilter::default()
    };
    store::scan(conn, &recent, |candidate| {
        if seen.insert(candidate.id.clone()) {
            candidates.push(candidate);
        }
        ControlFlow::Continue(())
    })?;

    let mut extra_ids: Vec<String> = Vec::new();
    if let (Some(embedding), true) = (&memory.embedding, options.similar_candidates > 0) {
        let mut stmt = conn.prepare(
            "SELECT id FROM memories_vec WHERE embedding MATCH ?1 AND k = ?2 ORDER BY distance",
        )?;
        let ids = stmt
            .query_map(
                params![embedding_to_bytes(embedding), (options.similar_candidates + 1) as i64],
                |row| row.get::<_, String>(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        extra_ids.extend(ids);
    }

    let keys: Vec<String> = memory.entities.iter().map(|e| normalize_entity(e)).collect();
    if !keys.is_empty() && options.candidate_limit > 0 {
        let placeholders = (0..keys.len()).map(|i| format!("?{}", i + 2)).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT DISTINCT memory_id FROM memory_entities \
             WHERE entity IN ({placeholders}) AND memory_id != ?1 LIMIT {}",
            options.candidate_limit
        );
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&memory.id];
        values.extend(keys.iter().map(|k| k as &dyn rusqlite::ToSql));
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(values.as_slice(), |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        extra_ids.extend(ids);
    }

    for id in extra_ids {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(candidate) = store::find(conn, &id)? {
            if !candidate.decayed {
                candidates.push(candidate);
            }
        }
    }

    Ok(candidates)
}

fn pair_is_linked(conn: &Connection, a: &str, b: &str) -> Result<bool> {
    Ok(find_relation(conn, a, b, &Relation::RelatesTo)?.is_some())
}

/// The `(source, target, relation)` edge, or its reverse for symmetric relations.
fn find_relation(conn: &Connection, source_id: &str, target_id: &str, relation: &Relation) -> Result<Option<Edge>> {
    if let Some(edge) = store::find_edge(conn, source_id, target_id, relation.as_str())? {
        return Ok(Some(edge));
    }
    if relation.is_symmetric() {
        return store::find_edge(conn, target_id, source_id, relation.as_str());
    }
    Ok(None)
}

/// Assert a typed edge between two live memories.
///
/// Re-relating an existing `(source, target, relation)` updates its weight,
/// marks it explicit and reports `deduplicated: true`. A symmetric relation
/// matches the pair in either direction.
pub fn relate(
    conn: &mut Connection,
    source_id: &str,
    target_id: &str,
    relation: Relation,
    weight: Option<f64>,
) -> Result<RelateResult> {
    let weight = weight.unwrap_or(1.0);
    if !(0.0..=1.0).contains(&weight) {
        return Err(MemoryError::invalid(format!("weight must be within [0, 1], got {weight}")));
    }
    for id in [source_id, target_id] {
        if store::get(conn, id)?.decayed {
            return Err(MemoryError::invalid(format!("memory {id} is decayed and cannot be linked")));
        }
    }
    if source_id == target_id {
        return Err(MemoryError::invalid("an edge cannot connect a memory to itself"));
    }

    if let Some(existing) = find_relation(conn, source_id, target_id, &relation)? {
        let edge = store::update_edge(conn, &existing.id, weight, EdgeOrigin::Explicit)?;
        return Ok(RelateResult {
            edge,
            deduplicated: true,
        });
    }

    let edge = store::insert_edge(
        conn,
        NewEdge {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relation,
            weight,
            origin: EdgeOrigin::Explicit,
        },
    )?;
    Ok(RelateResult {
        edge,
        deduplicated: false,
    })
}

/// Live memories one edge away from `id`, strongest edge first.
pub fn neighbors(conn: &Connection, id: &str) -> Result<Vec<Neighbor>> {
    let mut out = Vec::new();
    for edge in store::edges_for(conn, id, Direction::Both)? {
        let Some(other) = edge.other_end(id).map(str::to_owned) else {
            continue;
        };
        match store::find(conn, &other)? {
            Some(memory) if !memory.decayed => out.push(Neighbor { edge, memory }),
            _ => {}
        }
    }
    Ok(out)
}
