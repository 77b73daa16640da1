pub mod query_memory;
pub mod save_memory;

use query_memory::QueryMemoryParams;
use rmcp::handler::server::tool::{Parameters, ToolRouter};
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use save_memory::SaveMemoryParams;
use std::future::Future;
use std::sync::Arc;

use crate::controller::RetrievalController;

/// The memgate MCP tool handler. Holds the retrieval controller and exposes
/// the tool surface via the `#[tool_router]` macro. Tool handlers never
/// error into the protocol layer — every failure is an `ERROR:` sentinel in
/// the text content.
#[derive(Clone)]
pub struct GatewayTools {
    tool_router: ToolRouter<Self>,
    controller: Arc<RetrievalController>,
}

#[tool_router]
impl GatewayTools {
    pub fn new(controller: Arc<RetrievalController>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            controller,
        }
    }

    /// Retrieve privacy-sanitized context for a topic.
    #[tool(
        description = "Query personal memory for a topic. Returns sanitized context with PII redacted, NO_CONTEXT_FOUND when nothing matches, or NO_CONTEXT when the content is blocked pending consent."
    )]
    async fn query_personal_memory(
        &self,
        Parameters(params): Parameters<QueryMemoryParams>,
    ) -> Result<String, String> {
        tracing::info!(topic = %params.topic, "query_personal_memory called");
        Ok(self.controller.handle_query(&params.topic).await)
    }

    /// Save an explicit user fact.
    #[tool(
        description = "Save a fact to personal memory. Stored as a user fact, separate from ingested documents."
    )]
    async fn save_memory(
        &self,
        Parameters(params): Parameters<SaveMemoryParams>,
    ) -> Result<String, String> {
        tracing::info!(
            fact_len = params.fact.as_deref().map(str::len).unwrap_or(0),
            category = params.category.as_deref().unwrap_or("-"),
            "save_memory called"
        );
        Ok(self
            .controller
            .save_fact(params.fact.as_deref(), params.category.as_deref())
            .await)
    }
}

#[tool_handler]
impl ServerHandler for GatewayTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "memgate is a privacy-safe personal memory gateway. Use \
                 query_personal_memory to retrieve sanitized context and \
                 save_memory to store facts."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
