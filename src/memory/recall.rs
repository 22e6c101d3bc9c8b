//! Recall engine: ranked retrieval with graph expansion.
//!
//! With a query embedding every live record is scored
//! `0.5·cosine + 0.3·importance + 0.2·recency`. Without a query embedding the
//! whole recall runs on keywords, `0.7·match + 0.3·importance`.
//!
//! Records stored without an embedding keep the keyword formula even when the
//! query is embedded, and are ranked in the same list. The two scales differ:
//! a whole-phrase keyword hit scores at least 0.7 and sits above most vector
//! hits, while a record with no keyword match is not returned at all. Strong hits
//! (score above `expansion_threshold`) then pull in their graph neighbours,
//! tagged as graph-derived and merged into the ranking by score.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::ops::ControlFlow;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use super::graph;
use super::store::{self, ScanFilter};
use super::types::Memory;
use super::{cosine_similarity, timestamp};
use crate::config::RetrievalConfig;
use crate::error::{MemoryError, Result};

const W_SIMILARITY: f64 = 0.5;
const W_IMPORTANCE: f64 = 0.3;
const W_RECENCY: f64 = 0.2;

const W_KEYWORD: f64 = 0.7;
const W_KEYWORD_IMPORTANCE: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct RecallOptions {
    pub limit: usize,
    pub expansion_threshold: f64,
    pub max_expansion: usize,
    pub recency_horizon_days: f64,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for RecallOptions {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            limit: config.default_limit,
            expansion_threshold: config.expansion_threshold,
            max_expansion: config.max_expansion,
            recency_horizon_days: config.recency_horizon_days,
        }
    }
}

/// How a result earned its place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Vector,
    Keyword,
    Graph,
}

/// The edge that pulled in a graph-derived result.
#[derive(Debug, Clone, Serialize)]
pub struct GraphVia {
    pub from_id: String,
    pub relation: String,
    pub weight: f64,
}

/// One ranked result. The score components are included so the score can be recomputed.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMemory {
    #[serde(flatten)]
    pub memory: Memory,
    pub score: f64,
    pub method: MatchMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_match: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<GraphVia>,
}

#[derive(Debug, Serialize)]
pub struct RecallResponse {
    pub query: String,
    /// `true` when no query embedding was available and keyword scoring was used throughout.
    pub keyword_fallback: bool,
    pub direct: usize,
    pub expanded: usize,
    pub results: Vec<ScoredMemory>,
}

impl RecallResponse {
    pub fn ids(&self) -> Vec<String> {
        self.results.iter().map(|r| r.memory.id.clone()).collect()
    }
}

/// Logarithmic freshness in `[0, 1]`: 1 when just accessed, 0 at the horizon and beyond.
pub fn recency_score(last_accessed_at: DateTime<Utc>, now: DateTime<Utc>, horizon_days: f64) -> f64 {
    if horizon_days <= 0.0 {
        return 0.0;
    }
    let days = ((now - last_accessed_at).num_seconds() as f64 / 86_400.0).max(0.0);
    (1.0 - (1.0 + days).ln() / (1.0 + horizon_days).ln()).clamp(0.0, 1.0)
}

pub fn vector_score(similarity: f64, importance: f64, recency: f64) -> f64 {
    W_SIMILARITY * similarity + W_IMPORTANCE * importance + W_RECENCY * recency
}

pub fn keyword_score(match_strength: f64, importance: f64) -> f64 {
    W_KEYWORD * match_strength + W_KEYWORD_IMPORTANCE * importance
}

/// How well `text` matches `query`: 1.0 for a case-insensitive substring
/// match of the whole query, otherwise the fraction of query terms that
/// appear as words in `text`.
pub fn keyword_match_strength(query: &str, text: &str) -> f64 {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return 0.0;
    }
    let text = text.to_lowercase();
    if text.contains(&query) {
        return 1.0;
    }

    let words: HashSet<&str> = tokens(&text).collect();
    let mut terms: Vec<&str> = tokens(&query).collect();
    terms.sort_unstable();
    terms.dedup();
    if terms.is_empty() {
        return 0.0;
    }
    let hits = terms.iter().filter(|t| words.contains(*t)).count();
    hits as f64 / terms.len() as f64
}

fn tokens(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty())
}

/// Rank live memories against `query`.
///
/// Pure read: access tracking is left to [`record_access`] so callers can
/// apply it off the response path.
pub fn recall(
    conn: &Connection,
    query: &str,
    query_embedding: Option<&[f32]>,
    options: &RecallOptions,
    now: DateTime<Utc>,
) -> Result<RecallResponse> {
    let query = query.trim();
    if query.is_empty() {
        return Err(MemoryError::invalid("query must not be empty"));
    }

    let mut direct: Vec<ScoredMemory> = Vec::new();
    store::scan(conn, &ScanFilter::active(), |memory| {
        if let Some(scored) = score(memory, query, query_embedding, options, now) {
            direct.push(scored);
        }
        ControlFlow::Continue(())
    })?;

    direct.sort_by(rank_order);
    direct.truncate(options.limit);

    let expanded = expand(conn, &direct, options)?;

    tracing::debug!(
        query = %query,
        direct = direct.len(),
        expanded = expanded.len(),
        keyword_fallback = query_embedding.is_none(),
        "recall complete"
    );

    let (n_direct, n_expanded) = (direct.len(), expanded.len());
    // Expansion is additive: every direct hit stays, and a graph hit scores at most its parent.
    direct.extend(expanded);
    direct.sort_by(rank_order);
    Ok(RecallResponse {
        query: query.to_string(),
        keyword_fallback: query_embedding.is_none(),
        direct: n_direct,
        expanded: n_expanded,
        results: direct,
    })
}

fn score(
    memory: Memory,
    query: &str,
    query_embedding: Option<&[f32]>,
    options: &RecallOptions,
    now: DateTime<Utc>,
) -> Option<ScoredMemory> {
    if let (Some(q), Some(e)) = (query_embedding, memory.embedding.as_deref()) {
        let similarity = cosine_similarity(q, e);
        let recency = recency_score(memory.last_accessed_at, now, options.recency_horizon_days);
        return Some(ScoredMemory {
            score: vector_score(similarity, memory.importance, recency),
            memory,
            method: MatchMethod::Vector,
            similarity: Some(similarity),
            recency: Some(recency),
            keyword_match: None,
            via: None,
        });
    }

    let strength = keyword_match_strength(query, &memory.text);
    if strength <= 0.0 {
        return None;
    }
    Some(ScoredMemory {
        score: keyword_score(strength, memory.importance),
        memory,
        method: MatchMethod::Keyword,
        similarity: None,
        recency: None,
        keyword_match: Some(strength),
        via: None,
    })
}

/// Score descending, then newest first, then id.
fn rank_order(a: &ScoredMemory, b: &ScoredMemory) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
        .then_with(|| b.memory.id.cmp(&a.memory.id))
}

fn expand(conn: &Connection, direct: &[ScoredMemory], options: &RecallOptions) -> Result<Vec<ScoredMemory>> {
    let mut included: HashSet<String> = direct.iter().map(|r| r.memory.id.clone()).collect();
    let mut expanded: Vec<ScoredMemory> = Vec::new();

    'parents: for parent in direct.iter().filter(|r| r.score > options.expansion_threshold) {
        for neighbor in graph::neighbors(conn, &parent.memory.id)? {
            if expanded.len() >= options.max_expansion {
                break 'parents;
            }
            if !included.insert(neighbor.memory.id.clone()) {
                continue;
            }
            expanded.push(ScoredMemory {
                score: parent.score * neighbor.edge.weight,
                memory: neighbor.memory,
                method: MatchMethod::Graph,
                similarity: None,
                recency: None,
                keyword_match: None,
                via: Some(GraphVia {
                    from_id: parent.memory.id.clone(),
                    relation: neighbor.edge.relation.to_string(),
                    weight: neighbor.edge.weight,
                }),
            });
        }
    }

    Ok(expanded)
}

/// Bump access count and last-access time for recalled records. Decayed records are left alone.
pub fn record_access(conn: &mut Connection, ids: &[String], at: DateTime<Utc>) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let tx = conn.transaction()?;
    let at = timestamp(at);
    let mut touched = 0;
    {
        let mut stmt = tx.prepare(
            "UPDATE memories SET access_count = access_count + 1, last_accessed_at = ?1 \
             WHERE id = ?2 AND decayed = 0",
        )?;
        for id in ids {
            touched += stmt.execute(params![at, id])?;
        }
    }
    tx.commit()?;
    Ok(touched)
}
