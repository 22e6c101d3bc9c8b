//! The memory engine.
//!
//! Data flows one way on write (text → embedding + entities → stored record →
//! auto-linked edges, see [`remember`]) and fans out on read (query → embedding →
//! scored candidates → graph expansion, see [`recall`]). [`maintenance`] keeps
//! the store healthy in periodic batches.

pub mod entities;
pub mod export;
pub mod graph;
pub mod ingest;
pub mod maintenance;
pub mod recall;
pub mod remember;
pub mod stats;
pub mod store;
pub mod timeline;
pub mod types;

use chrono::{DateTime, SecondsFormat, Utc};

/// Serialize an embedding as little-endian f32 bytes (the `memories.embedding`
/// blob and sqlite-vec's input format).
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Decode a little-endian f32 blob. Returns `None` if the length is not a multiple of 4.
pub fn bytes_to_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Cosine similarity in `[-1, 1]`; 0 for mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Canonical timestamp encoding. Fixed width, so stored values compare
/// correctly as text.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Parse a caller-supplied instant: RFC 3339, or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_datetime(s: &str) -> crate::error::Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = parse_timestamp(s) {
        return Ok(dt);
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            crate::error::MemoryError::invalid(format!(
                "invalid date {s:?}: expected RFC 3339 or YYYY-MM-DD"
            ))
        })
}

/// Truncate content to `max_chars` characters, appending "..." if truncated.
pub(crate) fn truncate_preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &content[..end]),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_bytes_round_trip() {
        let v = vec![0.25f32, -1.5, 3.0];
        let bytes = embedding_to_bytes(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes_to_embedding(&bytes).unwrap(), v);
        assert!(bytes_to_embedding(&bytes[..5]).is_none());
    }

    #[test]
    fn cosine_of_orthogonal_and_parallel_vectors() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-9);
        assert!((cosine_similarity(&[2.0, 0.0], &[5.0, 0.0]) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn timestamps_sort_as_text() {
        let early = timestamp(Utc::now() - chrono::Duration::days(3));
        let late = timestamp(Utc::now());
        assert!(early < late);
        assert_eq!(parse_timestamp(&late).map(timestamp).unwrap(), late);
    }

    #[test]
    fn parses_dates_and_rfc3339() {
        let day = parse_datetime("2026-03-01").unwrap();
        assert_eq!(timestamp(day), "2026-03-01T00:00:00.000000Z");
        let exact = parse_datetime("2026-03-01T12:30:00+02:00").unwrap();
        assert_eq!(timestamp(exact), "2026-03-01T10:30:00.000000Z");
        assert!(parse_datetime("last tuesday").is_err());
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(truncate_preview("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_preview("short", 10), "short");
    }
}
