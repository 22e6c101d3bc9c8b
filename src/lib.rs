//! Hybrid vector-graph memory for AI agents, served over MCP.
//!
//! Mnemograph stores short natural-language memories in SQLite, embeds them
//! into a 384-dimensional vector space via
//! [sqlite-vec](https://github.com/asg017/sqlite-vec), extracts the named
//! entities they mention, and links related memories into a typed graph.
//! Recall ranks direct matches by similarity, importance and recency, then
//! walks strong edges to surface associated memories.
//!
//! Memories live in two tiers:
//!
//! | Tier | Purpose |
//! |------|---------|
//! | **Episodic** | Fresh observations. The default for new memories. |
//! | **Semantic** | Consolidated knowledge, promoted by reflection once a memory is accessed often and important enough. |
//!
//! A periodic reflection cycle prunes stale low-importance memories, reports
//! near-duplicates, promotes frequently recalled ones and removes edges left
//! dangling by forgotten records. Forgetting is a soft delete; `purge`
//! reclaims space for records forgotten long ago.
//!
//! # Modules
//!
//! - [`config`]: TOML configuration with environment overrides
//! - [`db`]: connection setup, schema, migrations, health checks, corruption recovery
//! - [`embedding`]: text-to-vector providers (local ONNX model or feature hashing)
//! - [`memory`]: the engine itself: store, entities, graph, recall, maintenance, import/export
//! - [`service`]: async facade that serializes access to the store
//! - [`tools`]: MCP tool handlers
//! - [`server`]: stdio and Streamable HTTP entry points

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod server;
pub mod service;
pub mod tools;
