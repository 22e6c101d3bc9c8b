pub mod export;
pub mod forget;
pub mod import_bulk;
pub mod recall;
pub mod reflect;
pub mod relate;
pub mod remember;
pub mod stats;
pub mod timeline;

use export::ExportParams;
use forget::ForgetParams;
use import_bulk::ImportBulkParams;
use recall::RecallParams;
use reflect::ReflectParams;
use relate::RelateParams;
use remember::RememberParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use serde::Serialize;
use stats::StatsParams;
use timeline::TimelineParams;

use crate::error::{MemoryError, Result};
use crate::memory::parse_datetime;
use crate::memory::types::Tier;
use crate::service::MemoryService;

/// The MCP tool handler. Wraps a [`MemoryService`] and exposes every
/// operation via the `#[tool_router]` macro.
///
/// Tools answer with JSON. Failures come back as
/// `{"error": {"kind": ..., "message": ...}}`.
#[derive(Clone)]
pub struct MnemographTools {
    tool_router: ToolRouter<Self>,
    service: MemoryService,
}

fn respond<T: Serialize>(outcome: Result<T>) -> std::result::Result<String, String> {
    let encode_error = |e: &MemoryError| {
        tracing::warn!(kind = e.kind(), error = %e, "tool call failed");
        serde_json::to_string(&e.to_payload()).unwrap_or_else(|_| e.to_string())
    };
    match outcome {
        Ok(value) => serde_json::to_string(&value).map_err(|e| encode_error(&MemoryError::from(e))),
        Err(e) => Err(encode_error(&e)),
    }
}

fn parse_tier(tier: Option<&str>) -> Result<Option<Tier>> {
    tier.map(str::parse).transpose()
}

#[tool_router]
impl MnemographTools {
    pub fn new(service: MemoryService) -> Self {
        Self {
            tool_router: Self::tool_router(),
            service,
        }
    }

    #[tool(description = "Store a memory. Entities are extracted, importance is estimated unless given, and the memory is linked to related memories automatically.")]
    async fn remember(
        &self,
        Parameters(params): Parameters<RememberParams>,
    ) -> std::result::Result<String, String> {
        tracing::info!(text_len = params.text.len(), "remember called");
        let outcome = match parse_tier(params.tier.as_deref()) {
            Ok(tier) => self.service.remember(params.text, params.importance, tier).await,
            Err(e) => Err(e),
        };
        respond(outcome)
    }

    #[tool(description = "Retrieve memories relevant to a natural language query, ranked by similarity, importance and recency. Strong matches also bring in connected memories from the knowledge graph.")]
    async fn recall(
        &self,
        Parameters(params): Parameters<RecallParams>,
    ) -> std::result::Result<String, String> {
        tracing::info!(query = %params.query, limit = ?params.limit, "recall called");
        respond(self.service.recall(params.query, params.limit).await)
    }

    #[tool(description = "Forget a memory by ID. It stays in the store for audit but is never recalled or linked again.")]
    async fn forget(
        &self,
        Parameters(params): Parameters<ForgetParams>,
    ) -> std::result::Result<String, String> {
        tracing::info!(id = %params.id, "forget called");
        respond(self.service.forget(params.id).await)
    }

    #[tool(description = "Create a typed relationship between two memories (relates_to, contradicts, supersedes, caused_by, part_of, or a custom snake_case label).")]
    async fn relate(
        &self,
        Parameters(params): Parameters<RelateParams>,
    ) -> std::result::Result<String, String> {
        tracing::info!(
            source = %params.source_id,
            target = %params.target_id,
            relation = %params.relation,
            "relate called"
        );
        respond(
            self.service
                .relate(params.source_id, params.target_id, params.relation, params.weight)
                .await,
        )
    }

    #[tool(description = "Run a maintenance cycle: prune stale low-importance episodic memories, report near-duplicates, promote frequently used memories to semantic, and remove edges to forgotten memories.")]
    async fn reflect(
        &self,
        Parameters(params): Parameters<ReflectParams>,
    ) -> std::result::Result<String, String> {
        tracing::info!("reflect called");
        respond(
            self.service
                .reflect(params.prune_days, params.similarity_threshold)
                .await,
        )
    }

    #[tool(description = "List memories in chronological order, optionally only those mentioning an entity or created since a date.")]
    async fn timeline(
        &self,
        Parameters(params): Parameters<TimelineParams>,
    ) -> std::result::Result<String, String> {
        tracing::info!(entity = ?params.entity, since = ?params.since, "timeline called");
        let outcome = match params.since.as_deref().map(parse_datetime).transpose() {
            Ok(since) => self.service.timeline(params.entity, since, params.limit).await,
            Err(e) => Err(e),
        };
        respond(outcome)
    }

    #[tool(description = "Get memory store statistics: counts by tier, edges, entities, storage size and embedding status.")]
    async fn stats(
        &self,
        Parameters(_params): Parameters<StatsParams>,
    ) -> std::result::Result<String, String> {
        tracing::info!("stats called");
        respond(self.service.stats().await)
    }

    #[tool(description = "Import a block of text (notes, a document, a transcript). It is split into chunks and each chunk is remembered.")]
    async fn import_bulk(
        &self,
        Parameters(params): Parameters<ImportBulkParams>,
    ) -> std::result::Result<String, String> {
        tracing::info!(source_len = params.source_text.len(), "import_bulk called");
        let outcome = match parse_tier(params.tier.as_deref()) {
            Ok(tier) => self.service.import_bulk(params.source_text, tier).await,
            Err(e) => Err(e),
        };
        respond(outcome)
    }

    #[tool(description = "Export all live memories and relationships as JSON (without embeddings).")]
    async fn export(
        &self,
        Parameters(_params): Parameters<ExportParams>,
    ) -> std::result::Result<String, String> {
        tracing::info!("export called");
        respond(self.service.export().await)
    }
}

#[tool_handler]
impl ServerHandler for MnemographTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Mnemograph is a long-term memory store. Use remember to save facts and events, \
                 recall to retrieve them, relate to connect memories, and reflect periodically \
                 to keep the store tidy."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
