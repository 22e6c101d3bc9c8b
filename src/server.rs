//! MCP server initialization for stdio and Streamable HTTP transports.
//!
//! Provides [`serve_stdio`] and [`serve_http`] entry points that wire up the
//! store, the embedder and the MCP tool handler into a running server.

use std::sync::Arc;

use anyhow::Result;
use rmcp::ServiceExt;

use crate::config::MnemographConfig;
use crate::db;
use crate::embedding::Embedder;
use crate::service::MemoryService;
use crate::tools::MnemographTools;

/// Open (or recover) the store and build the service. The embedding model is
/// not loaded here; the first request that needs a vector loads it.
pub fn build_service(config: MnemographConfig) -> Result<MemoryService> {
    let db_path = config.resolved_db_path();
    let conn = if config.storage.auto_recover {
        let opened = db::open_or_recover(&db_path)?;
        if let Some(backup) = &opened.recovered_from {
            tracing::warn!(backup = %backup.display(), "started on an empty store after corruption");
        }
        opened.conn
    } else {
        db::open_database(&db_path)?
    };
    tracing::info!(db = %db_path.display(), "database ready");

    let embedder = Embedder::from_config(&config.embedding);

    // Vectors from different models are not comparable
    match db::migrations::get_embedding_model(&conn)? {
        Some(stored) if stored != embedder.model_id() => {
            tracing::warn!(
                stored = %stored,
                configured = %embedder.model_id(),
                "embedding model changed; similarity against older memories will be unreliable"
            );
        }
        Some(_) => {}
        None => db::migrations::set_embedding_model(&conn, embedder.model_id())?,
    }

    Ok(MemoryService::new(conn, Arc::new(embedder), config).with_db_path(db_path))
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: MnemographConfig) -> Result<()> {
    tracing::info!("starting mnemograph MCP server on stdio");

    let service = build_service(config)?;
    let tools = MnemographTools::new(service);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP transport.
pub async fn serve_http(config: MnemographConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting mnemograph MCP server on HTTP");

    let service = build_service(config)?;

    let http = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(MnemographTools::new(service.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", http);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
