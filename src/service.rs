//! Async facade over the memory engine.
//!
//! [`MemoryService`] owns the shared connection and embedder and exposes the
//! public operations. Blocking work (SQLite, inference) runs on tokio's
//! blocking pool; the connection lock is held per operation, and per step
//! during reflection, so interactive calls interleave with maintenance.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::MnemographConfig;
use crate::embedding::{embed_with_timeout, Embedder};
use crate::error::{MemoryError, Result};
use crate::memory::entities::EntityExtractor;
use crate::memory::export::{self, ExportDocument, RestoreReport};
use crate::memory::graph::{self, LinkOptions, LinkResult, RelateResult};
use crate::memory::ingest::{self, ImportFailure, ImportReport};
use crate::memory::maintenance::{self, PurgeReport, ReflectOptions, ReflectReport, Step};
use crate::memory::recall::{self, RecallOptions, RecallResponse};
use crate::memory::remember::{self, RememberResult};
use crate::memory::stats::{self, StatsResponse};
use crate::memory::store;
use crate::memory::timeline::{self, TimelineResponse};
use crate::memory::types::{EdgeOrigin, Memory, Relation, Tier};

#[derive(Debug, Serialize)]
pub struct ForgetResult {
    pub id: String,
    /// `false` if the memory was already decayed.
    pub changed: bool,
}

#[derive(Clone)]
pub struct MemoryService {
    db: Arc<Mutex<Connection>>,
    embedder: Arc<Embedder>,
    config: Arc<MnemographConfig>,
    extractor: Arc<EntityExtractor>,
    db_path: Option<PathBuf>,
    background: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl MemoryService {
    pub fn new(conn: Connection, embedder: Arc<Embedder>, config: MnemographConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            embedder,
            config: Arc::new(config),
            extractor: Arc::new(EntityExtractor::default()),
            db_path: None,
            background: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record the on-disk location, used for size reporting.
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    pub fn embedder(&self) -> &Arc<Embedder> {
        &self.embedder
    }

    pub fn config(&self) -> &MnemographConfig {
        &self.config
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| MemoryError::Task(format!("database lock poisoned: {e}")))?;
            f(&mut conn)
        })
        .await?
    }

    /// Embed `text`, or `None` when the embedder is unavailable or too slow.
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let timeout = Duration::from_millis(self.config.embedding.timeout_ms);
        match embed_with_timeout(Arc::clone(&self.embedder), text.to_string(), timeout).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                tracing::debug!(error = %e, "continuing without embedding");
                None
            }
        }
    }

    fn link_options(&self) -> LinkOptions {
        LinkOptions::from(&self.config.linking)
    }

    pub async fn remember(
        &self,
        text: String,
        importance: Option<f64>,
        tier: Option<Tier>,
    ) -> Result<RememberResult> {
        if text.trim().is_empty() {
            return Err(MemoryError::invalid("text must not be empty"));
        }
        let embedding = self.embed(&text).await;
        let extractor = Arc::clone(&self.extractor);
        let options = self.link_options();
        self.with_conn(move |conn| {
            remember::remember(conn, &text, importance, tier, embedding, &extractor, &options)
        })
        .await
    }

    /// Ranked retrieval. Access counts are updated in the background after
    /// the response is built.
    pub async fn recall(&self, query: String, limit: Option<usize>) -> Result<RecallResponse> {
        if query.trim().is_empty() {
            return Err(MemoryError::invalid("query must not be empty"));
        }
        let mut options = RecallOptions::from(&self.config.retrieval);
        if let Some(limit) = limit {
            if limit == 0 {
                return Err(MemoryError::invalid("limit must be at least 1"));
            }
            options.limit = limit;
        }

        let query_embedding = self.embed(&query).await;
        let now = Utc::now();
        let response = self
            .with_conn(move |conn| recall::recall(conn, &query, query_embedding.as_deref(), &options, now))
            .await?;

        self.track_access(response.ids(), now);
        Ok(response)
    }

    fn track_access(&self, ids: Vec<String>, at: DateTime<Utc>) {
        if ids.is_empty() {
            return;
        }
        let db = Arc::clone(&self.db);
        let handle = tokio::task::spawn_blocking(move || {
            let outcome = db
                .lock()
                .map_err(|e| MemoryError::Task(format!("database lock poisoned: {e}")))
                .and_then(|mut conn| recall::record_access(&mut conn, &ids, at));
            if let Err(e) = outcome {
                tracing::warn!(error = %e, "failed to record access");
            }
        });
        if let Ok(mut pending) = self.background.lock() {
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }
    }

    /// Wait for background access updates to land.
    pub async fn settle(&self) {
        let pending: Vec<JoinHandle<()>> = match self.background.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(_) => return,
        };
        for handle in pending {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "access tracking task failed");
            }
        }
    }

    pub async fn get(&self, id: String) -> Result<Memory> {
        self.with_conn(move |conn| store::get(conn, &id)).await
    }

    /// Soft-delete a memory. Forgetting twice is not an error.
    pub async fn forget(&self, id: String) -> Result<ForgetResult> {
        self.with_conn(move |conn| {
            let changed = store::soft_delete(conn, &id, Some("forget"))?;
            tracing::info!(id = %id, changed, "memory forgotten");
            Ok(ForgetResult { id, changed })
        })
        .await
    }

    pub async fn relate(
        &self,
        source_id: String,
        target_id: String,
        relation: String,
        weight: Option<f64>,
    ) -> Result<RelateResult> {
        let relation = Relation::parse(relation.trim())?;
        self.with_conn(move |conn| graph::relate(conn, &source_id, &target_id, relation, weight))
            .await
    }

    /// Re-run the linker for one existing memory.
    pub async fn link(&self, id: String) -> Result<LinkResult> {
        let options = self.link_options();
        self.with_conn(move |conn| graph::link_memory(conn, &id, &options)).await
    }

    /// Run the reflection cycle, one connection lock per step.
    ///
    /// Duplicate detection works on an embedding snapshot taken under the
    /// lock and compared off it.
    pub async fn reflect(
        &self,
        prune_days: Option<u64>,
        similarity_threshold: Option<f64>,
    ) -> Result<ReflectReport> {
        let mut options = ReflectOptions::from(&self.config.maintenance);
        if let Some(days) = prune_days {
            options.prune_days = days;
        }
        if let Some(threshold) = similarity_threshold {
            options.similarity_threshold = threshold;
        }
        options.validate()?;

        let now = Utc::now();
        let mut report = ReflectReport::new(now);
        tracing::info!(prune_days = options.prune_days, "reflection started");

        let opts = options.clone();
        report.record(
            Step::Prune,
            self.with_conn(move |conn| maintenance::prune_stale(conn, &opts, now)).await,
        );

        let threshold = options.similarity_threshold;
        let duplicates = match self.with_conn(|conn| maintenance::load_embeddings(conn)).await {
            Ok(records) => {
                tokio::task::spawn_blocking(move || maintenance::find_duplicates(&records, threshold))
                    .await
                    .map_err(MemoryError::from)
            }
            Err(e) => Err(e),
        };
        report.record_duplicates(duplicates);

        let opts = options.clone();
        report.record(
            Step::Promote,
            self.with_conn(move |conn| maintenance::promote(conn, &opts)).await,
        );
        report.record(
            Step::OrphanCleanup,
            self.with_conn(maintenance::cleanup_orphans).await,
        );

        report.finish(Utc::now());
        Ok(report)
    }

    pub async fn timeline(
        &self,
        entity: Option<String>,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<TimelineResponse> {
        let limit = limit.unwrap_or(50);
        self.with_conn(move |conn| timeline::timeline(conn, entity.as_deref(), since, limit))
            .await
    }

    /// Store statistics. Reports the embedder's state without loading it.
    pub async fn stats(&self) -> Result<StatsResponse> {
        let db_path = self.db_path.clone();
        let mut response = self
            .with_conn(move |conn| stats::memory_stats(conn, db_path.as_deref()))
            .await?;
        response.embedder_loaded = self.embedder.is_loaded();
        Ok(response)
    }

    /// Split `source_text` into chunks and remember each one.
    ///
    /// A chunk that fails to store is reported and skipped.
    pub async fn import_bulk(&self, source_text: String, tier: Option<Tier>) -> Result<ImportReport> {
        let chunks = ingest::chunk_text(&source_text, self.config.ingest.chunk_chars);
        let mut report = ImportReport {
            chunks: chunks.len(),
            ..ImportReport::default()
        };

        for (index, chunk) in chunks.into_iter().enumerate() {
            match self.remember(chunk, None, tier).await {
                Ok(result) => {
                    report.stored += 1;
                    if !result.embedded {
                        report.keyword_only += 1;
                    }
                    report.links_created += result.links.len();
                    report.ids.push(result.memory.id);
                }
                Err(e) => {
                    tracing::warn!(chunk = index, error = %e, "failed to import chunk");
                    report.failures.push(ImportFailure {
                        chunk: index,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(chunks = report.chunks, stored = report.stored, "bulk import complete");
        Ok(report)
    }

    pub async fn export(&self) -> Result<ExportDocument> {
        self.with_conn(|conn| export::export(conn)).await
    }

    /// Re-ingest an export: every memory is remembered again (new ids,
    /// fresh embeddings and auto-links) and explicit edges are replayed.
    pub async fn restore(&self, document: ExportDocument) -> Result<RestoreReport> {
        let mut report = RestoreReport::default();
        let mut id_map = std::collections::HashMap::new();

        for memory in document.memories {
            let result = self
                .remember(memory.text, Some(memory.importance), Some(memory.tier))
                .await?;
            id_map.insert(memory.id, result.memory.id);
            report.memories_restored += 1;
        }

        for edge in document.edges.into_iter().filter(|e| e.origin == EdgeOrigin::Explicit) {
            match (id_map.get(&edge.source_id), id_map.get(&edge.target_id)) {
                (Some(source), Some(target)) => {
                    self.relate(source.clone(), target.clone(), edge.relation.to_string(), Some(edge.weight))
                        .await?;
                    report.edges_restored += 1;
                }
                _ => report.edges_skipped += 1,
            }
        }

        tracing::info!(
            memories = report.memories_restored,
            edges = report.edges_restored,
            "restore complete"
        );
        Ok(report)
    }

    /// Hard-delete memories that decayed more than `older_than_days` ago.
    pub async fn purge(&self, older_than_days: u64) -> Result<PurgeReport> {
        self.with_conn(move |conn| maintenance::purge_decayed(conn, older_than_days, Utc::now()))
            .await
    }
}
