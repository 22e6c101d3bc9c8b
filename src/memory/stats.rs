use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::Connection;
use serde::Serialize;

use crate::db::migrations;
use crate::error::Result;

/// Response from stats. Never loads the embedding model; `embedder_loaded`
/// is filled in by the caller from the embedder handle's status.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_memories: u64,
    pub active_memories: u64,
    pub decayed_memories: u64,
    /// Live memories per tier.
    pub by_tier: BTreeMap<String, u64>,
    /// Live memories stored with an embedding.
    pub embedded_memories: u64,
    pub keyword_only_memories: u64,
    pub total_edges: u64,
    pub edges_by_origin: BTreeMap<String, u64>,
    pub edges_by_relation: BTreeMap<String, u64>,
    /// Edges with a decayed endpoint, waiting for the next reflection.
    pub orphan_edges: u64,
    pub distinct_entities: u64,
    pub schema_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    pub embedder_loaded: bool,
    pub db_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_memory: Option<String>,
}

/// Compute store statistics.
///
/// `db_path` is used for file size calculation; pass None for in-memory databases.
pub fn memory_stats(conn: &Connection, db_path: Option<&Path>) -> Result<StatsResponse> {
    let count = |sql: &str| -> Result<u64> {
        let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as u64)
    };

    let total = count("SELECT COUNT(*) FROM memories")?;
    let active = count("SELECT COUNT(*) FROM memories WHERE decayed = 0")?;
    let embedded = count("SELECT COUNT(*) FROM memories WHERE decayed = 0 AND embedding IS NOT NULL")?;

    let mut by_tier = BTreeMap::from([("episodic".to_string(), 0), ("semantic".to_string(), 0)]);
    by_tier.extend(group_counts(
        conn,
        "SELECT tier, COUNT(*) FROM memories WHERE decayed = 0 GROUP BY tier",
    )?);

    let (oldest_memory, newest_memory) = conn.query_row(
        "SELECT MIN(created_at), MAX(created_at) FROM memories WHERE decayed = 0",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StatsResponse {
        total_memories: total,
        active_memories: active,
        decayed_memories: total - active,
        by_tier,
        embedded_memories: embedded,
        keyword_only_memories: active - embedded,
        total_edges: count("SELECT COUNT(*) FROM edges")?,
        edges_by_origin: group_counts(conn, "SELECT origin, COUNT(*) FROM edges GROUP BY origin")?,
        edges_by_relation: group_counts(conn, "SELECT relation, COUNT(*) FROM edges GROUP BY relation")?,
        orphan_edges: count(
            "SELECT COUNT(*) FROM edges e \
             JOIN memories s ON s.id = e.source_id JOIN memories t ON t.id = e.target_id \
             WHERE s.decayed = 1 OR t.decayed = 1",
        )?,
        distinct_entities: count(
            "SELECT COUNT(DISTINCT me.entity) FROM memory_entities me \
             JOIN memories m ON m.id = me.memory_id WHERE m.decayed = 0",
        )?,
        schema_version: migrations::get_schema_version(conn)?,
        embedding_model: migrations::get_embedding_model(conn)?,
        embedder_loaded: false,
        db_size_bytes,
        oldest_memory,
        newest_memory,
    })
}

fn group_counts(conn: &Connection, sql: &str) -> Result<BTreeMap<String, u64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
        .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
    Ok(rows)
}
