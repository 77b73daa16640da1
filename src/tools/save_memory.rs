//! MCP `save_memory` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `save_memory` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SaveMemoryParams {
    /// The fact to remember. Required; a missing or blank fact is rejected
    /// with an `ERROR:` sentinel rather than a protocol error.
    #[schemars(description = "The fact to remember")]
    pub fact: Option<String>,

    /// Optional category label for the fact.
    #[schemars(description = "Optional category label, e.g. 'personal' or 'work'")]
    pub category: Option<String>,
}
