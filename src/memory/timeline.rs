//! Chronological listing, optionally narrowed to one entity.

use std::ops::ControlFlow;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use super::store::{self, ScanFilter};
use super::types::Memory;
use crate::error::{MemoryError, Result};

#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    /// Oldest first.
    pub entries: Vec<Memory>,
    /// `true` if `limit` cut the listing short.
    pub truncated: bool,
}

/// Live memories in creation order, oldest first.
pub fn timeline(
    conn: &Connection,
    entity: Option<&str>,
    since: Option<DateTime<Utc>>,
    limit: usize,
) -> Result<TimelineResponse> {
    if limit == 0 {
        return Err(MemoryError::invalid("limit must be at least 1"));
    }
    let entity = entity.map(str::trim).filter(|e| !e.is_empty());

    let filter = ScanFilter {
        entity: entity.map(str::to_string),
        since,
        limit: Some(limit + 1),
        ..ScanFilter::default()
    };
    let mut entries = Vec::with_capacity(limit.min(256));
    let mut truncated = false;
    store::scan(conn, &filter, |memory| {
        if entries.len() == limit {
            truncated = true;
            return ControlFlow::Break(());
        }
        entries.push(memory);
        ControlFlow::Continue(())
    })?;

    Ok(TimelineResponse {
        entity: entity.map(str::to_string),
        since,
        entries,
        truncated,
    })
}
