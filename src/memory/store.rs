//! Durable storage for memories and edges.
//!
//! Every mutating function runs inside its own transaction and writes a
//! `memory_log` audit row before committing. Reads never mutate; access
//! tracking lives in [`super::recall::record_access`].

use std::ops::ControlFlow;

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::entities::normalize_entity;
use super::types::{Direction, Edge, EdgeOrigin, Memory, MemoryPatch, NewEdge, NewMemory, Tier};
use super::{bytes_to_embedding, embedding_to_bytes, parse_timestamp, timestamp};
use crate::embedding::EMBEDDING_DIM;
use crate::error::{MemoryError, Result};

const MEMORY_COLUMNS: &str = "id, text, embedding, tier, importance, created_at, \
     last_accessed_at, access_count, entities, decayed, decayed_at";

const EDGE_COLUMNS: &str = "id, source_id, target_id, relation, weight, origin, created_at";

/// Persist a new record with its entity index, vector index row and audit entry.
///
/// Fails with `Storage` on a constraint violation (e.g. a duplicate id) and
/// with `InvalidArgument` for out-of-range fields or a purged id.
pub fn insert(conn: &mut Connection, new: NewMemory) -> Result<Memory> {
    let text = new.text.trim();
    if text.is_empty() {
        return Err(MemoryError::invalid("text must not be empty"));
    }
    check_unit_range("importance", new.importance)?;
    if let Some(embedding) = &new.embedding {
        if embedding.len() != EMBEDDING_DIM {
            return Err(MemoryError::invalid(format!(
                "embedding must have {EMBEDDING_DIM} dimensions, got {}",
                embedding.len()
            )));
        }
    }

    let tx = conn.transaction()?;

    let id = match new.id {
        Some(id) => {
            if was_purged(&tx, &id)? {
                return Err(MemoryError::invalid(format!(
                    "id {id} belonged to a purged memory and cannot be reused"
                )));
            }
            id
        }
        None => uuid::Uuid::now_v7().to_string(),
    };
    let created_at = new.created_at.unwrap_or_else(Utc::now);
    let created = timestamp(created_at);
    let entities_json = serde_json::to_string(&new.entities)?;

    tx.execute(
        "INSERT INTO memories (id, text, embedding, tier, importance, created_at, \
         last_accessed_at, access_count, entities, decayed) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 0, ?7, 0)",
        params![
            id,
            text,
            new.embedding.as_deref().map(embedding_to_bytes),
            new.tier.as_str(),
            new.importance,
            created,
            entities_json,
        ],
    )?;

    for entity in &new.entities {
        tx.execute(
            "INSERT OR IGNORE INTO memory_entities (memory_id, entity) VALUES (?1, ?2)",
            params![id, normalize_entity(entity)],
        )?;
    }

    if let Some(embedding) = &new.embedding {
        tx.execute(
            "INSERT INTO memories_vec (id, embedding) VALUES (?1, ?2)",
            params![id, embedding_to_bytes(embedding)],
        )?;
    }

    write_audit_log(
        &tx,
        "create",
        &id,
        Some(&serde_json::json!({
            "tier": new.tier.as_str(),
            "embedded": new.embedding.is_some(),
            "entities": new.entities.len(),
        })),
    )?;
    tx.commit()?;

    tracing::debug!(id = %id, embedded = new.embedding.is_some(), "memory stored");

    Ok(Memory {
        id,
        text: text.to_string(),
        embedding: new.embedding,
        tier: new.tier,
        importance: new.importance,
        created_at: parse_timestamp(&created).unwrap_or(created_at),
        last_accessed_at: parse_timestamp(&created).unwrap_or(created_at),
        access_count: 0,
        entities: new.entities,
        decayed: false,
        decayed_at: None,
    })
}

/// Fetch one record, decayed or not.
pub fn get(conn: &Connection, id: &str) -> Result<Memory> {
    find(conn, id)?.ok_or_else(|| MemoryError::memory_not_found(id))
}

/// Fetch one record if it exists.
pub fn find(conn: &Connection, id: &str) -> Result<Option<Memory>> {
    let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], row_to_memory).optional()?)
}

/// Predicate for [`scan`].
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub include_decayed: bool,
    pub tier: Option<Tier>,
    /// Only records that carry an embedding.
    pub embedded_only: bool,
    /// Only records mentioning this entity (compared case-insensitively).
    pub entity: Option<String>,
    /// Only records created at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Order by `created_at` descending instead of ascending.
    pub newest_first: bool,
    pub limit: Option<usize>,
}

impl ScanFilter {
    pub fn active() -> Self {
        Self::default()
    }
}

/// Stream records matching `filter` into `visit`, in `created_at` order.
///
/// Rows are decoded one at a time; `visit` can stop the scan early by
/// returning `ControlFlow::Break`. Returns the number of records visited.
pub fn scan<F>(conn: &Connection, filter: &ScanFilter, mut visit: F) -> Result<usize>
where
    F: FnMut(Memory) -> ControlFlow<()>,
{
    let mut sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE 1 = 1");
    let mut values: Vec<Value> = Vec::new();

    if !filter.include_decayed {
        sql.push_str(" AND decayed = 0");
    }
    if let Some(tier) = filter.tier {
        values.push(Value::Text(tier.as_str().to_string()));
        sql.push_str(&format!(" AND tier = ?{}", values.len()));
    }
    if filter.embedded_only {
        sql.push_str(" AND embedding IS NOT NULL");
    }
    if let Some(entity) = &filter.entity {
        values.push(Value::Text(normalize_entity(entity)));
        sql.push_str(&format!(
            " AND id IN (SELECT memory_id FROM memory_entities WHERE entity = ?{})",
            values.len()
        ));
    }
    if let Some(since) = filter.since {
        values.push(Value::Text(timestamp(since)));
        sql.push_str(&format!(" AND created_at >= ?{}", values.len()));
    }
    let order = if filter.newest_first { "DESC" } else { "ASC" };
    sql.push_str(&format!(" ORDER BY created_at {order}, id {order}"));
    if let Some(limit) = filter.limit {
        values.push(Value::Integer(limit as i64));
        sql.push_str(&format!(" LIMIT ?{}", values.len()));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(values.iter()))?;
    let mut visited = 0;
    while let Some(row) = rows.next()? {
        visited += 1;
        if visit(row_to_memory(row)?).is_break() {
            break;
        }
    }
    Ok(visited)
}

/// Collect every record matching `filter`.
pub fn collect(conn: &Connection, filter: &ScanFilter) -> Result<Vec<Memory>> {
    let mut out = Vec::new();
    scan(conn, filter, |memory| {
        out.push(memory);
        ControlFlow::Continue(())
    })?;
    Ok(out)
}

/// Apply a partial update. Decay is terminal: un-decaying is rejected.
pub fn update_fields(conn: &mut Connection, id: &str, patch: &MemoryPatch) -> Result<Memory> {
    if let Some(importance) = patch.importance {
        check_unit_range("importance", importance)?;
    }

    let current = get(conn, id)?;
    if patch.is_empty() {
        return Ok(current);
    }
    if current.decayed && patch.decayed == Some(false) {
        return Err(MemoryError::invalid(format!("memory {id} is decayed; decay is terminal")));
    }

    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    let mut push = |column: &str, value: Value| {
        values.push(value);
        sets.push(format!("{column} = ?{}", values.len()));
    };

    if let Some(tier) = patch.tier {
        push("tier", Value::Text(tier.as_str().into()));
    }
    if let Some(importance) = patch.importance {
        push("importance", Value::Real(importance));
    }
    if let Some(count) = patch.access_count {
        push("access_count", Value::Integer(i64::from(count)));
    }
    if let Some(at) = patch.last_accessed_at {
        push("last_accessed_at", Value::Text(timestamp(at)));
    }
    if patch.decayed == Some(true) && !current.decayed {
        push("decayed", Value::Integer(1));
        push("decayed_at", Value::Text(timestamp(Utc::now())));
    }

    if !sets.is_empty() {
        values.push(Value::Text(id.to_string()));
        let sql = format!("UPDATE memories SET {} WHERE id = ?{}", sets.join(", "), values.len());

        let tx = conn.transaction()?;
        tx.execute(&sql, params_from_iter(values.iter()))?;
        write_audit_log(&tx, "update", id, Some(&serde_json::to_value(patch)?))?;
        tx.commit()?;
    }

    get(conn, id)
}

/// Mark a record decayed. Returns `false` if it already was.
pub fn soft_delete(conn: &mut Connection, id: &str, reason: Option<&str>) -> Result<bool> {
    let tx = conn.transaction()?;

    let exists: bool = tx
        .query_row("SELECT 1 FROM memories WHERE id = ?1", params![id], |_| Ok(true))
        .optional()?
        .unwrap_or(false);
    if !exists {
        return Err(MemoryError::memory_not_found(id));
    }

    let changed = tx.execute(
        "UPDATE memories SET decayed = 1, decayed_at = ?1 WHERE id = ?2 AND decayed = 0",
        params![timestamp(Utc::now()), id],
    )?;

    if changed > 0 {
        write_audit_log(
            &tx,
            "decay",
            id,
            Some(&serde_json::json!({ "reason": reason.unwrap_or("forget") })),
        )?;
    }
    tx.commit()?;

    Ok(changed > 0)
}

/// Insert one edge. Both endpoints must exist and be live; self-loops are rejected.
pub fn insert_edge(conn: &mut Connection, new: NewEdge) -> Result<Edge> {
    check_unit_range("weight", new.weight)?;
    if new.source_id == new.target_id {
        return Err(MemoryError::invalid("an edge cannot connect a memory to itself"));
    }

    let tx = conn.transaction()?;
    for endpoint in [&new.source_id, &new.target_id] {
        let decayed: Option<bool> = tx
            .query_row(
                "SELECT decayed FROM memories WHERE id = ?1",
                params![endpoint],
                |row| row.get(0),
            )
            .optional()?;
        match decayed {
            None => return Err(MemoryError::memory_not_found(endpoint.as_str())),
            Some(true) => {
                return Err(MemoryError::invalid(format!(
                    "memory {endpoint} is decayed and cannot be linked"
                )))
            }
            Some(false) => {}
        }
    }

    let edge = Edge {
        id: uuid::Uuid::now_v7().to_string(),
        source_id: new.source_id,
        target_id: new.target_id,
        relation: new.relation,
        weight: new.weight,
        origin: new.origin,
        created_at: Utc::now(),
    };

    tx.execute(
        "INSERT INTO edges (id, source_id, target_id, relation, weight, origin, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            edge.id,
            edge.source_id,
            edge.target_id,
            edge.relation.as_str(),
            edge.weight,
            edge.origin.as_str(),
            timestamp(edge.created_at),
        ],
    )?;
    write_audit_log(
        &tx,
        "link",
        &edge.source_id,
        Some(&serde_json::json!({
            "edge_id": edge.id,
            "target_id": edge.target_id,
            "relation": edge.relation.as_str(),
            "weight": edge.weight,
            "origin": edge.origin.as_str(),
        })),
    )?;
    tx.commit()?;

    Ok(edge)
}

/// Look up the edge with this exact `(source, target, relation)` triple.
pub fn find_edge(
    conn: &Connection,
    source_id: &str,
    target_id: &str,
    relation: &str,
) -> Result<Option<Edge>> {
    let sql = format!(
        "SELECT {EDGE_COLUMNS} FROM edges WHERE source_id = ?1 AND target_id = ?2 AND relation = ?3"
    );
    Ok(conn
        .query_row(&sql, params![source_id, target_id, relation], row_to_edge)
        .optional()?)
}

/// Change an edge's weight and origin in place.
pub fn update_edge(conn: &mut Connection, edge_id: &str, weight: f64, origin: EdgeOrigin) -> Result<Edge> {
    check_unit_range("weight", weight)?;
    let tx = conn.transaction()?;
    let source_id: String = tx
        .query_row("SELECT source_id FROM edges WHERE id = ?1", params![edge_id], |row| row.get(0))
        .optional()?
        .ok_or_else(|| MemoryError::edge_not_found(edge_id))?;
    tx.execute(
        "UPDATE edges SET weight = ?1, origin = ?2 WHERE id = ?3",
        params![weight, origin.as_str(), edge_id],
    )?;
    write_audit_log(
        &tx,
        "link",
        &source_id,
        Some(&serde_json::json!({ "edge_id": edge_id, "weight": weight, "updated": true })),
    )?;
    tx.commit()?;

    let sql = format!("SELECT {EDGE_COLUMNS} FROM edges WHERE id = ?1");
    Ok(conn.query_row(&sql, params![edge_id], row_to_edge)?)
}

/// Edges incident to `id`, strongest first.
pub fn edges_for(conn: &Connection, id: &str, direction: Direction) -> Result<Vec<Edge>> {
    let predicate = match direction {
        Direction::Outgoing => "source_id = ?1",
        Direction::Incoming => "target_id = ?1",
        Direction::Both => "(source_id = ?1 OR target_id = ?1)",
    };
    let sql = format!(
        "SELECT {EDGE_COLUMNS} FROM edges WHERE {predicate} ORDER BY weight DESC, created_at ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let edges = stmt
        .query_map(params![id], row_to_edge)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

/// Every edge whose endpoints are both live, oldest first.
pub fn live_edges(conn: &Connection) -> Result<Vec<Edge>> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.source_id, e.target_id, e.relation, e.weight, e.origin, e.created_at \
         FROM edges e \
         JOIN memories s ON s.id = e.source_id AND s.decayed = 0 \
         JOIN memories t ON t.id = e.target_id AND t.decayed = 0 \
         ORDER BY e.created_at, e.id",
    )?;
    let edges = stmt
        .query_map([], row_to_edge)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

/// Remove one edge by id.
pub fn delete_edge(conn: &mut Connection, edge_id: &str) -> Result<()> {
    let tx = conn.transaction()?;
    let source_id: String = tx
        .query_row("SELECT source_id FROM edges WHERE id = ?1", params![edge_id], |row| row.get(0))
        .optional()?
        .ok_or_else(|| MemoryError::edge_not_found(edge_id))?;
    tx.execute("DELETE FROM edges WHERE id = ?1", params![edge_id])?;
    write_audit_log(&tx, "unlink", &source_id, Some(&serde_json::json!({ "edge_id": edge_id })))?;
    tx.commit()?;
    Ok(())
}

/// Write an entry to the `memory_log` audit table.
pub(crate) fn write_audit_log(
    conn: &Connection,
    operation: &str,
    memory_id: &str,
    details: Option<&serde_json::Value>,
) -> Result<()> {
    let details_json = details.map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO memory_log (operation, memory_id, details, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![operation, memory_id, details_json, timestamp(Utc::now())],
    )?;
    Ok(())
}

fn was_purged(conn: &Connection, id: &str) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM memory_log WHERE operation = 'purge' AND memory_id = ?1 LIMIT 1",
            params![id],
            |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false))
}

fn check_unit_range(field: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(MemoryError::invalid(format!("{field} must be within [0, 1], got {value}")));
    }
    Ok(())
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(|e| conversion_error(idx, format!("bad timestamp {raw:?}: {e}")))
}

fn row_to_memory(row: &Row) -> rusqlite::Result<Memory> {
    let embedding = row
        .get::<_, Option<Vec<u8>>>(2)?
        .map(|bytes| {
            bytes_to_embedding(&bytes)
                .ok_or_else(|| conversion_error(2, format!("embedding blob of {} bytes", bytes.len())))
        })
        .transpose()?;
    let tier: String = row.get(3)?;
    let entities: String = row.get(8)?;
    let decayed_at = row
        .get::<_, Option<String>>(10)?
        .map(|raw| parse_timestamp(&raw).map_err(|e| conversion_error(10, e.to_string())))
        .transpose()?;

    Ok(Memory {
        id: row.get(0)?,
        text: row.get(1)?,
        embedding,
        tier: tier.parse().map_err(|e: MemoryError| conversion_error(3, e.to_string()))?,
        importance: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
        last_accessed_at: timestamp_column(row, 6)?,
        access_count: row.get(7)?,
        entities: serde_json::from_str(&entities).map_err(|e| conversion_error(8, e.to_string()))?,
        decayed: row.get(9)?,
        decayed_at,
    })
}

fn row_to_edge(row: &Row) -> rusqlite::Result<Edge> {
    let relation: String = row.get(3)?;
    let origin: String = row.get(5)?;
    Ok(Edge {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        relation: relation
            .parse()
            .map_err(|e: MemoryError| conversion_error(3, e.to_string()))?,
        weight: row.get(4)?,
        origin: origin
            .parse()
            .map_err(|e: MemoryError| conversion_error(5, e.to_string()))?,
        created_at: timestamp_column(row, 6)?,
    })
}
