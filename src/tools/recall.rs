//! MCP `recall` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `recall` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RecallParams {
    /// Natural language query.
    #[schemars(description = "Natural language query")]
    pub query: String,

    /// Maximum number of direct results. Graph-expanded results come on top.
    #[schemars(
        description = "Maximum number of direct results (default 7). Up to 3 graph-related memories may be added."
    )]
    pub limit: Option<usize>,
}
