//! MCP `remember` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `remember` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RememberParams {
    /// The text to store.
    #[schemars(description = "The text to remember")]
    pub text: String,

    /// Importance override in `[0.0, 1.0]`. Estimated from the text when omitted.
    #[schemars(
        description = "Importance from 0.0 to 1.0. When omitted it is estimated from text length and entity count."
    )]
    pub importance: Option<f64>,

    /// `"episodic"` (default) or `"semantic"`.
    #[schemars(description = "Tier: 'episodic' (default) or 'semantic'")]
    pub tier: Option<String>,
}
