use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReflectParams {
    #[schemars(description = "Prune low-importance episodic memories not accessed for this many days (default 30)")]
    pub prune_days: Option<u64>,

    #[schemars(description = "Cosine similarity at which two memories are reported as duplicates (default 0.95)")]
    pub similarity_threshold: Option<f64>,
}
