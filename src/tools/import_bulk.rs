//! MCP `import_bulk` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `import_bulk` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ImportBulkParams {
    /// Free text; split on paragraphs and sentences into memory-sized chunks.
    #[schemars(description = "Text to import. Split into paragraph-sized chunks, each stored as one memory.")]
    pub source_text: String,

    #[schemars(description = "Tier for every chunk: 'episodic' (default) or 'semantic'")]
    pub tier: Option<String>,
}
