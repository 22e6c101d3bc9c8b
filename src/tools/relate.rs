//! MCP `relate` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `relate` MCP tool.
///
/// Idempotent on the (source, target, relation) triple: relating again updates the weight.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RelateParams {
    #[schemars(description = "ID of the source memory")]
    pub source_id: String,

    #[schemars(description = "ID of the target memory")]
    pub target_id: String,

    /// Well-known (`relates_to`, `contradicts`, `supersedes`, `caused_by`, `part_of`)
    /// or custom lowercase snake_case.
    #[schemars(
        description = "Relation: relates_to, contradicts, supersedes, caused_by, part_of, or a custom lowercase snake_case label"
    )]
    pub relation: String,

    #[schemars(description = "Edge weight from 0.0 to 1.0 (default 1.0)")]
    pub weight: Option<f64>,
}
