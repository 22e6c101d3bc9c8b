//! MCP `stats` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The `stats` tool takes no arguments.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct StatsParams {}
