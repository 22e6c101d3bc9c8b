#![allow(dead_code)]

use std::sync::Arc;

use mnemograph::config::MnemographConfig;
use mnemograph::db;
use mnemograph::embedding::hashed::HashingProvider;
use mnemograph::embedding::{l2_normalize, Embedder, EMBEDDING_DIM};
use mnemograph::memory::entities::extract_entities;
use mnemograph::memory::store;
use mnemograph::memory::timestamp;
use mnemograph::memory::types::{Memory, NewMemory};
use mnemograph::service::MemoryService;
use rusqlite::{params, Connection};

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// Service backed by the feature-hashing embedder: deterministic, no model files.
pub fn hash_service() -> MemoryService {
    MemoryService::new(
        test_db(),
        Arc::new(Embedder::with_provider("hash", Arc::new(HashingProvider))),
        MnemographConfig::default(),
    )
}

/// Service whose embedder is always unavailable, forcing the keyword path.
pub fn keyword_service() -> MemoryService {
    MemoryService::new(test_db(), Arc::new(Embedder::unavailable()), MnemographConfig::default())
}

/// Deterministic unit vector with a spike at position `seed`.
pub fn test_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[seed % EMBEDDING_DIM] = 1.0;
    v
}

/// A vector close to `base`, cosine well above 0.95.
pub fn similar_embedding(base: &[f32]) -> Vec<f32> {
    let mut v = base.to_vec();
    for i in 0..5 {
        v[(i * 37) % EMBEDDING_DIM] += 0.02;
    }
    l2_normalize(&v)
}

/// Insert a memory directly through the store, with entities extracted from `text`.
pub fn insert_memory(
    conn: &mut Connection,
    text: &str,
    importance: f64,
    embedding: Option<Vec<f32>>,
) -> Memory {
    store::insert(
        conn,
        NewMemory {
            text: text.into(),
            importance,
            embedding,
            entities: extract_entities(text),
            ..NewMemory::default()
        },
    )
    .unwrap()
}

/// Move a memory's creation and last access `days` into the past.
pub fn backdate(conn: &Connection, id: &str, days: i64) {
    let at = timestamp(chrono::Utc::now() - chrono::Duration::days(days));
    conn.execute(
        "UPDATE memories SET created_at = ?1, last_accessed_at = ?1 WHERE id = ?2",
        params![at, id],
    )
    .unwrap();
}

/// Force a memory's access count, as if it had been recalled `count` times.
pub fn set_access_count(conn: &Connection, id: &str, count: u32) {
    conn.execute(
        "UPDATE memories SET access_count = ?1 WHERE id = ?2",
        params![count, id],
    )
    .unwrap();
}

/// Count rows in a table.
pub fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}
