//! Reflection: prune stale episodes, report near-duplicates, promote
//! frequently used memories and drop edges that touch decayed records.
//!
//! Each step is its own transaction and writes audit entries only when it
//! changes something, so a second run over an unchanged store is a no-op.
//! A failing step is logged and recorded in the report; the cycle carries on.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use super::store::write_audit_log;
use super::{bytes_to_embedding, cosine_similarity, timestamp};
use crate::config::MaintenanceConfig;
use crate::embedding::EMBEDDING_DIM;
use crate::error::{MemoryError, Result};

// ── Options and report ───────────────────────────────────────────────────────

/// Upper bound for any maintenance window given in days.
pub const MAX_WINDOW_DAYS: u64 = 36_500;

/// `now` minus `days`, rejecting windows beyond [`MAX_WINDOW_DAYS`].
pub fn window_cutoff(now: DateTime<Utc>, days: u64, name: &str) -> Result<DateTime<Utc>> {
    let out_of_range =
        || MemoryError::invalid(format!("{name} must be at most {MAX_WINDOW_DAYS}, got {days}"));
    if days > MAX_WINDOW_DAYS {
        return Err(out_of_range());
    }
    let window = i64::try_from(days)
        .ok()
        .and_then(Duration::try_days)
        .ok_or_else(out_of_range)?;
    now.checked_sub_signed(window).ok_or_else(out_of_range)
}

#[derive(Debug, Clone)]
pub struct ReflectOptions {
    /// Episodic memories untouched for this many days are pruned...
    pub prune_days: u64,
    /// ...if their importance is below this.
    pub prune_importance: f64,
    /// Cosine similarity at or above which two memories are reported as duplicates.
    pub similarity_threshold: f64,
    pub promote_min_access: u32,
    pub promote_min_importance: f64,
}

impl Default for ReflectOptions {
    fn default() -> Self {
        Self::from(&MaintenanceConfig::default())
    }
}

impl From<&MaintenanceConfig> for ReflectOptions {
    fn from(config: &MaintenanceConfig) -> Self {
        Self {
            prune_days: config.prune_days,
            prune_importance: config.prune_importance,
            similarity_threshold: config.dedup_threshold,
            promote_min_access: config.promote_min_access,
            promote_min_importance: config.promote_min_importance,
        }
    }
}

impl ReflectOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(MemoryError::invalid(format!(
                "similarity_threshold must be within (0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.prune_importance)
            || !(0.0..=1.0).contains(&self.promote_min_importance)
        {
            return Err(MemoryError::invalid("importance thresholds must be within [0, 1]"));
        }
        if self.prune_days > MAX_WINDOW_DAYS {
            return Err(MemoryError::invalid(format!(
                "prune_days must be at most {MAX_WINDOW_DAYS}, got {}",
                self.prune_days
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Prune,
    Deduplicate,
    Promote,
    OrphanCleanup,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prune => "prune",
            Self::Deduplicate => "deduplicate",
            Self::Promote => "promote",
            Self::OrphanCleanup => "orphan_cleanup",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicatePair {
    /// The record to keep: higher importance, then older.
    pub keep: String,
    pub duplicate: String,
    pub similarity: f64,
}

#[derive(Debug, Serialize)]
pub struct StepError {
    pub step: Step,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ReflectReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pruned: usize,
    pub duplicates: Vec<DuplicatePair>,
    pub promoted: usize,
    pub orphan_edges_removed: usize,
    pub errors: Vec<StepError>,
}

impl ReflectReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: None,
            pruned: 0,
            duplicates: Vec::new(),
            promoted: 0,
            orphan_edges_removed: 0,
            errors: Vec::new(),
        }
    }

    /// Store a counting step's outcome, or log and keep its error.
    pub fn record(&mut self, step: Step, outcome: Result<usize>) {
        match outcome {
            Ok(n) => match step {
                Step::Prune => self.pruned = n,
                Step::Promote => self.promoted = n,
                Step::OrphanCleanup => self.orphan_edges_removed = n,
                Step::Deduplicate => {}
            },
            Err(e) => self.fail(step, e),
        }
    }

    pub fn record_duplicates(&mut self, outcome: Result<Vec<DuplicatePair>>) {
        match outcome {
            Ok(pairs) => self.duplicates = pairs,
            Err(e) => self.fail(Step::Deduplicate, e),
        }
    }

    fn fail(&mut self, step: Step, error: MemoryError) {
        tracing::error!(step = step.as_str(), error = %error, "reflection step failed");
        self.errors.push(StepError {
            step,
            message: error.to_string(),
        });
    }

    pub fn finish(&mut self, at: DateTime<Utc>) {
        self.finished_at = Some(at);
        tracing::info!(
            pruned = self.pruned,
            duplicates = self.duplicates.len(),
            promoted = self.promoted,
            orphan_edges_removed = self.orphan_edges_removed,
            errors = self.errors.len(),
            "reflection complete"
        );
    }
}

// ── Steps ────────────────────────────────────────────────────────────────────

/// Decay low-importance episodic memories not accessed within `prune_days`.
pub fn prune_stale(conn: &mut Connection, options: &ReflectOptions, now: DateTime<Utc>) -> Result<usize> {
    let cutoff = timestamp(window_cutoff(now, options.prune_days, "prune_days")?);
    let tx = conn.transaction()?;

    let ids: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT id FROM memories WHERE decayed = 0 AND tier = 'episodic' \
             AND importance < ?1 AND last_accessed_at < ?2",
        )?;
        let rows = stmt.query_map(params![options.prune_importance, cutoff], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let decayed_at = timestamp(now);
    for id in &ids {
        tx.execute(
            "UPDATE memories SET decayed = 1, decayed_at = ?1 WHERE id = ?2",
            params![decayed_at, id],
        )?;
        write_audit_log(
            &tx,
            "decay",
            id,
            Some(&serde_json::json!({ "reason": "prune", "prune_days": options.prune_days })),
        )?;
    }
    tx.commit()?;

    if !ids.is_empty() {
        tracing::info!(count = ids.len(), "pruned stale episodic memories");
    }
    Ok(ids.len())
}

/// Snapshot of one embedded record, for duplicate detection off the connection.
#[derive(Debug, Clone)]
pub struct EmbeddedRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub importance: f64,
    pub created_at: String,
}

/// Read every live embedding. Malformed blobs are skipped with a warning.
pub fn load_embeddings(conn: &Connection) -> Result<Vec<EmbeddedRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, embedding, importance, created_at FROM memories \
         WHERE decayed = 0 AND embedding IS NOT NULL ORDER BY created_at, id",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let blob: Vec<u8> = row.get(1)?;
        match bytes_to_embedding(&blob) {
            Some(embedding) if embedding.len() == EMBEDDING_DIM => out.push(EmbeddedRecord {
                id,
                embedding,
                importance: row.get(2)?,
                created_at: row.get(3)?,
            }),
            _ => tracing::warn!(id = %id, bytes = blob.len(), "skipping malformed embedding"),
        }
    }
    Ok(out)
}

/// All pairs at or above `threshold`. Reports only; nothing is merged.
pub fn find_duplicates(records: &[EmbeddedRecord], threshold: f64) -> Vec<DuplicatePair> {
    let mut pairs = Vec::new();
    for (i, a) in records.iter().enumerate() {
        for b in &records[i + 1..] {
            let similarity = cosine_similarity(&a.embedding, &b.embedding);
            if similarity < threshold {
                continue;
            }
            let a_first = a.importance > b.importance
                || (a.importance == b.importance && a.created_at <= b.created_at);
            let (keep, duplicate) = if a_first { (a, b) } else { (b, a) };
            pairs.push(DuplicatePair {
                keep: keep.id.clone(),
                duplicate: duplicate.id.clone(),
                similarity,
            });
        }
    }
    pairs.sort_by(|x, y| y.similarity.total_cmp(&x.similarity));
    pairs
}

/// Move frequently accessed, important episodic memories to the semantic tier.
pub fn promote(conn: &mut Connection, options: &ReflectOptions) -> Result<usize> {
    let tx = conn.transaction()?;

    let ids: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT id FROM memories WHERE decayed = 0 AND tier = 'episodic' \
             AND access_count >= ?1 AND importance >= ?2",
        )?;
        let rows = stmt.query_map(
            params![options.promote_min_access, options.promote_min_importance],
            |row| row.get(0),
        )?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    for id in &ids {
        tx.execute("UPDATE memories SET tier = 'semantic' WHERE id = ?1", params![id])?;
        write_audit_log(&tx, "promote", id, Some(&serde_json::json!({ "tier": "semantic" })))?;
    }
    tx.commit()?;

    if !ids.is_empty() {
        tracing::info!(count = ids.len(), "promoted memories to semantic tier");
    }
    Ok(ids.len())
}

/// Delete every edge with a decayed endpoint, explicit ones included.
pub fn cleanup_orphans(conn: &mut Connection) -> Result<usize> {
    let tx = conn.transaction()?;
    let removed = tx.execute(
        "DELETE FROM edges WHERE source_id IN (SELECT id FROM memories WHERE decayed = 1) \
         OR target_id IN (SELECT id FROM memories WHERE decayed = 1)",
        [],
    )?;
    if removed > 0 {
        write_audit_log(
            &tx,
            "unlink",
            "batch:orphans",
            Some(&serde_json::json!({ "removed": removed })),
        )?;
    }
    tx.commit()?;
    Ok(removed)
}

/// Run the whole cycle on one connection.
pub fn reflect(conn: &mut Connection, options: &ReflectOptions, now: DateTime<Utc>) -> Result<ReflectReport> {
    options.validate()?;
    let mut report = ReflectReport::new(now);

    report.record(Step::Prune, prune_stale(conn, options, now));
    report.record_duplicates(
        load_embeddings(conn).map(|records| find_duplicates(&records, options.similarity_threshold)),
    );
    report.record(Step::Promote, promote(conn, options));
    report.record(Step::OrphanCleanup, cleanup_orphans(conn));

    report.finish(Utc::now());
    Ok(report)
}

// ── Purge ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PurgeReport {
    pub purged: usize,
    pub ids: Vec<String>,
}

/// Hard-delete memories that decayed more than `older_than_days` ago.
///
/// Their edges and entity rows go with them; the ids stay reserved through
/// the audit log.
pub fn purge_decayed(conn: &mut Connection, older_than_days: u64, now: DateTime<Utc>) -> Result<PurgeReport> {
    let cutoff = timestamp(window_cutoff(now, older_than_days, "older_than_days")?);
    let tx = conn.transaction()?;

    let ids: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT id FROM memories WHERE decayed = 1 AND COALESCE(decayed_at, last_accessed_at) <= ?1",
        )?;
        let rows = stmt.query_map(params![cutoff], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    for id in &ids {
        tx.execute("DELETE FROM memories_vec WHERE id = ?1", params![id])?;
        tx.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        write_audit_log(&tx, "purge", id, None)?;
    }
    tx.commit()?;

    if !ids.is_empty() {
        tracing::info!(count = ids.len(), older_than_days, "purged decayed memories");
    }
    Ok(PurgeReport {
        purged: ids.len(),
        ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::memory::graph::relate;
    use crate::memory::store;
    use crate::memory::types::{Direction, NewMemory, Relation, Tier};

    fn insert(conn: &mut Connection, text: &str, importance: f64, embedding: Option<Vec<f32>>) -> String {
        store::insert(
            conn,
            NewMemory {
                text: text.into(),
                importance,
                embedding,
                ..NewMemory::default()
            },
        )
        .unwrap()
        .id
    }

    fn backdate(conn: &Connection, id: &str, days: i64) {
        let then = timestamp(Utc::now() - Duration::days(days));
        conn.execute(
            "UPDATE memories SET created_at = ?1, last_accessed_at = ?1 WHERE id = ?2",
            params![then, id],
        )
        .unwrap();
    }

    fn axis(hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING_DIM];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn prune_takes_only_old_unimportant_episodes() {
        let mut conn = open_memory_database().unwrap();
        let stale = insert(&mut conn, "stale", 0.2, None);
        let important = insert(&mut conn, "important", 0.8, None);
        let fresh = insert(&mut conn, "fresh", 0.2, None);
        let semantic = insert(&mut conn, "semantic", 0.2, None);
        for id in [&stale, &important, &semantic] {
            backdate(&conn, id, 40);
        }
        conn.execute("UPDATE memories SET tier = 'semantic' WHERE id = ?1", [&semantic])
            .unwrap();

        let pruned = prune_stale(&mut conn, &ReflectOptions::default(), Utc::now()).unwrap();
        assert_eq!(pruned, 1);
        assert!(store::get(&conn, &stale).unwrap().decayed);
        for id in [&important, &fresh, &semantic] {
            assert!(!store::get(&conn, id).unwrap().decayed);
        }
    }

    #[test]
    fn duplicates_are_reported_not_merged() {
        let mut conn = open_memory_database().unwrap();
        let a = insert(&mut conn, "a", 0.4, Some(axis(0)));
        let b = insert(&mut conn, "b", 0.9, Some(axis(0)));
        insert(&mut conn, "c", 0.5, Some(axis(1)));

        let pairs = find_duplicates(&load_embeddings(&conn).unwrap(), 0.95);
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].keep.as_str(), pairs[0].duplicate.as_str()), (b.as_str(), a.as_str()));
        assert!(!store::get(&conn, &a).unwrap().decayed);
    }

    #[test]
    fn promotion_needs_access_and_importance() {
        let mut conn = open_memory_database().unwrap();
        let hot = insert(&mut conn, "hot", 0.6, None);
        let trivial = insert(&mut conn, "trivial", 0.2, None);
        let cold = insert(&mut conn, "cold", 0.9, None);
        conn.execute("UPDATE memories SET access_count = 5 WHERE id IN (?1, ?2)", [&hot, &trivial])
            .unwrap();

        assert_eq!(promote(&mut conn, &ReflectOptions::default()).unwrap(), 1);
        assert_eq!(store::get(&conn, &hot).unwrap().tier, Tier::Semantic);
        assert_eq!(store::get(&conn, &trivial).unwrap().tier, Tier::Episodic);
        assert_eq!(store::get(&conn, &cold).unwrap().tier, Tier::Episodic);
    }

    #[test]
    fn orphan_cleanup_removes_edges_of_decayed_memories() {
        let mut conn = open_memory_database().unwrap();
        let a = insert(&mut conn, "a", 0.5, None);
        let b = insert(&mut conn, "b", 0.5, None);
        let c = insert(&mut conn, "c", 0.5, None);
        relate(&mut conn, &a, &b, Relation::CausedBy, None).unwrap();
        relate(&mut conn, &b, &c, Relation::PartOf, None).unwrap();
        store::soft_delete(&mut conn, &c, None).unwrap();

        assert_eq!(cleanup_orphans(&mut conn).unwrap(), 1);
        assert_eq!(store::edges_for(&conn, &b, Direction::Both).unwrap().len(), 1);
        assert_eq!(cleanup_orphans(&mut conn).unwrap(), 0);
    }

    #[test]
    fn reflect_twice_changes_nothing_the_second_time() {
        let mut conn = open_memory_database().unwrap();
        let stale = insert(&mut conn, "stale", 0.1, None);
        let other = insert(&mut conn, "other", 0.5, None);
        relate(&mut conn, &stale, &other, Relation::RelatesTo, None).unwrap();
        backdate(&conn, &stale, 60);
        let hot = insert(&mut conn, "hot", 0.7, None);
        conn.execute("UPDATE memories SET access_count = 9 WHERE id = ?1", [&hot]).unwrap();

        let first = reflect(&mut conn, &ReflectOptions::default(), Utc::now()).unwrap();
        assert_eq!((first.pruned, first.promoted, first.orphan_edges_removed), (1, 1, 1));
        assert!(first.errors.is_empty());

        let log_rows = |conn: &Connection| -> i64 {
            conn.query_row("SELECT COUNT(*) FROM memory_log", [], |r| r.get(0)).unwrap()
        };
        let before = log_rows(&conn);
        let second = reflect(&mut conn, &ReflectOptions::default(), Utc::now()).unwrap();
        assert_eq!((second.pruned, second.promoted, second.orphan_edges_removed), (0, 0, 0));
        assert_eq!(log_rows(&conn), before);
    }

    #[test]
    fn invalid_threshold_is_rejected() {
        let mut conn = open_memory_database().unwrap();
        let options = ReflectOptions { similarity_threshold: 1.5, ..ReflectOptions::default() };
        assert!(matches!(
            reflect(&mut conn, &options, Utc::now()),
            Err(MemoryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn oversized_windows_are_rejected() {
        let mut conn = open_memory_database().unwrap();
        let fresh = insert(&mut conn, "written just now", 0.1, None);

        for days in [u64::MAX, 1 << 40, MAX_WINDOW_DAYS + 1] {
            let options = ReflectOptions { prune_days: days, ..ReflectOptions::default() };
            assert!(matches!(
                reflect(&mut conn, &options, Utc::now()),
                Err(MemoryError::InvalidArgument(_))
            ));
            assert!(matches!(
                prune_stale(&mut conn, &options, Utc::now()),
                Err(MemoryError::InvalidArgument(_))
            ));
            assert!(matches!(
                purge_decayed(&mut conn, days, Utc::now()),
                Err(MemoryError::InvalidArgument(_))
            ));
        }
        assert!(!store::get(&conn, &fresh).unwrap().decayed);

        let cutoff = window_cutoff(Utc::now(), MAX_WINDOW_DAYS, "prune_days").unwrap();
        assert!(cutoff < Utc::now());
    }

    #[test]
    fn failed_step_is_recorded_and_the_cycle_continues() {
        let mut conn = open_memory_database().unwrap();
        let hot = insert(&mut conn, "hot", 0.7, None);
        conn.execute("UPDATE memories SET access_count = 9 WHERE id = ?1", [&hot]).unwrap();
        conn.execute_batch("DROP TABLE edges").unwrap();

        let report = reflect(&mut conn, &ReflectOptions::default(), Utc::now()).unwrap();
        assert_eq!(report.promoted, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].step, Step::OrphanCleanup);
    }

    #[test]
    fn purge_hard_deletes_old_decayed_records_and_reserves_ids() {
        let mut conn = open_memory_database().unwrap();
        let old = insert(&mut conn, "old", 0.5, Some(axis(2)));
        let recent = insert(&mut conn, "recent", 0.5, None);
        store::soft_delete(&mut conn, &old, None).unwrap();
        store::soft_delete(&mut conn, &recent, None).unwrap();
        let then = timestamp(Utc::now() - Duration::days(100));
        conn.execute("UPDATE memories SET decayed_at = ?1 WHERE id = ?2", params![then, old])
            .unwrap();

        let report = purge_decayed(&mut conn, 90, Utc::now()).unwrap();
        assert_eq!(report.ids, vec![old.clone()]);
        assert!(store::find(&conn, &old).unwrap().is_none());
        assert!(store::find(&conn, &recent).unwrap().is_some());

        let reuse = store::insert(
            &mut conn,
            NewMemory {
                id: Some(old),
                text: "again".into(),
                importance: 0.5,
                ..NewMemory::default()
            },
        );
        assert!(matches!(reuse, Err(MemoryError::InvalidArgument(_))));
    }
}
