//! Portable snapshot of the live graph.
//!
//! Embeddings are left out (they are model-specific and recomputed on
//! restore), as are decayed memories and any edge touching one.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::store::{self, ScanFilter};
use super::types::{Edge, Memory};
use crate::error::Result;

pub const EXPORT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportDocument {
    pub format_version: u32,
    pub exported_at: DateTime<Utc>,
    pub memories: Vec<Memory>,
    pub edges: Vec<Edge>,
}

/// Summary of a restore from an [`ExportDocument`].
#[derive(Debug, Default, Serialize)]
pub struct RestoreReport {
    pub memories_restored: usize,
    pub edges_restored: usize,
    /// Explicit edges whose endpoints could not be mapped.
    pub edges_skipped: usize,
}

pub fn export(conn: &Connection) -> Result<ExportDocument> {
    let memories = store::collect(conn, &ScanFilter::active())?;

    let edges = store::live_edges(conn)?;

    tracing::info!(memories = memories.len(), edges = edges.len(), "export complete");

    Ok(ExportDocument {
        format_version: EXPORT_FORMAT_VERSION,
        exported_at: Utc::now(),
        memories,
        edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::memory::graph::relate;
    use crate::memory::types::{NewMemory, Relation};

    fn insert(conn: &mut Connection, text: &str) -> String {
        store::insert(
            conn,
            NewMemory {
                text: text.into(),
                importance: 0.5,
                embedding: Some(crate::embedding::l2_normalize(&vec![1.0; crate::embedding::EMBEDDING_DIM])),
                ..NewMemory::default()
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn export_skips_decayed_memories_and_their_edges() {
        let mut conn = open_memory_database().unwrap();
        let a = insert(&mut conn, "a");
        let b = insert(&mut conn, "b");
        let c = insert(&mut conn, "c");
        relate(&mut conn, &a, &b, Relation::CausedBy, None).unwrap();
        relate(&mut conn, &a, &c, Relation::PartOf, None).unwrap();
        store::soft_delete(&mut conn, &c, None).unwrap();

        let doc = export(&conn).unwrap();
        assert_eq!(doc.memories.len(), 2);
        assert_eq!(doc.edges.len(), 1);
        assert_eq!(doc.edges[0].target_id, b);
    }

    #[test]
    fn exported_json_has_no_embeddings() {
        let mut conn = open_memory_database().unwrap();
        insert(&mut conn, "embedded");
        let json = serde_json::to_value(export(&conn).unwrap()).unwrap();
        assert!(json["memories"][0].get("embedding").is_none());
        assert_eq!(json["format_version"], 1);

        let back: ExportDocument = serde_json::from_value(json).unwrap();
        assert!(back.memories[0].embedding.is_none());
    }
}
