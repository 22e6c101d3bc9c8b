//! MCP `timeline` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `timeline` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TimelineParams {
    #[schemars(description = "Only memories mentioning this entity (case-insensitive)")]
    pub entity: Option<String>,

    #[schemars(description = "Only memories created at or after this time (RFC 3339 or YYYY-MM-DD)")]
    pub since: Option<String>,

    #[schemars(description = "Maximum number of entries (default 50)")]
    pub limit: Option<usize>,
}
