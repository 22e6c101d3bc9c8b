use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The `export` tool takes no arguments.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExportParams {}
