//! MCP `query_personal_memory` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `query_personal_memory` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct QueryMemoryParams {
    /// Natural-language topic to retrieve sanitized context for.
    #[schemars(description = "Natural language topic to retrieve sanitized memory context for")]
    pub topic: String,
}
