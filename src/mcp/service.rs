//! MCP service implementation using rmcp.
//!
//! This module defines the CatalogService struct with the catalog tools
//! exposed via the MCP protocol using the rmcp framework's macros.
//! Every tool call resolves the caller's identity from the HTTP request
//! that carried it before touching the database.

use crate::auth::auth_context_from_parts;
use crate::broker::CatalogBroker;
use crate::error::DbError;
use crate::identity::Identity;
use crate::tools::{
    CatalogToolHandler, DescribeObjectInput, DescribeObjectOutput, FindObjectsInput,
    FindObjectsOutput, HealthCheckOutput, HealthToolHandler, ListObjectsInput, ListObjectsOutput,
    RefreshIndexOutput, SearchToolHandler,
};
use axum::http::request::Parts;
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct CatalogService {
    /// Shared broker for all catalog operations
    broker: Arc<CatalogBroker>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl CatalogService {
    pub fn new(broker: Arc<CatalogBroker>) -> Self {
        Self {
            broker,
            tool_router: Self::tool_router(),
        }
    }

    pub fn broker(&self) -> &Arc<CatalogBroker> {
        &self.broker
    }

    /// Resolve the caller from the HTTP request behind this tool call.
    ///
    /// Stdio requests carry no request parts and resolve to no identity.
    fn identity(&self, context: &RequestContext<RoleServer>) -> Result<Option<Identity>, McpError> {
        let auth = context
            .extensions
            .get::<Parts>()
            .and_then(auth_context_from_parts);
        let identity = self.broker.resolve_identity(auth.as_ref())?;
        if let Some(identity) = &identity {
            debug!(subject = %identity.subject, "Resolved caller identity");
        }
        Ok(identity)
    }
}

#[tool_router]
impl CatalogService {
    #[tool(
        description = "List database objects of one kind: schema, table, view, function or script.\nOptional `like_pattern` (SQL LIKE, e.g. `CUST%`) and `regexp_pattern` (must match the whole name, e.g. `CUST.*`) narrow the result by object name. They combine with the server's configured patterns and never widen the listing.\nOptional `schema` restricts the listing to one schema.\nOnly objects visible to the calling user are returned."
    )]
    async fn list_objects(
        &self,
        Parameters(input): Parameters<ListObjectsInput>,
        context: RequestContext<RoleServer>,
    ) -> Result<Json<ListObjectsOutput>, McpError> {
        let identity = self.identity(&context)?;
        let handler = CatalogToolHandler::new(self.broker.clone());
        handler
            .list_objects(identity.as_ref(), input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(
        description = "Describe one database object.\nTables and views return their columns (with foreign keys for tables); functions and scripts return their parameters.\nThe name may be schema-qualified: `sales.orders` or `\"My Schema\".\"Orders\"`."
    )]
    async fn describe_object(
        &self,
        Parameters(input): Parameters<DescribeObjectInput>,
        context: RequestContext<RoleServer>,
    ) -> Result<Json<DescribeObjectOutput>, McpError> {
        let identity = self.identity(&context)?;
        let handler = CatalogToolHandler::new(self.broker.clone());
        handler
            .describe_object(identity.as_ref(), input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(
        description = "Find database objects by keywords, e.g. \"customer orders\".\nResults are ranked by relevance (BM25) over object names and comments.\nUse `kind` to restrict the search and `top_k` to limit the number of results."
    )]
    async fn find_objects(
        &self,
        Parameters(input): Parameters<FindObjectsInput>,
        context: RequestContext<RoleServer>,
    ) -> Result<Json<FindObjectsOutput>, McpError> {
        let identity = self.identity(&context)?;
        let handler = SearchToolHandler::new(self.broker.clone());
        handler
            .find_objects(identity.as_ref(), input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(
        description = "Rebuild the search index from the live catalog.\nUse after objects were created or dropped; the index otherwise refreshes on its own after a few minutes."
    )]
    async fn refresh_index(
        &self,
        context: RequestContext<RoleServer>,
    ) -> Result<Json<RefreshIndexOutput>, McpError> {
        let identity = self.identity(&context)?;
        let handler = SearchToolHandler::new(self.broker.clone());
        handler
            .refresh_index(identity.as_ref())
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(
        description = "Check that the database is reachable for the calling user.\nReports the database user the session runs as, latency and pool usage."
    )]
    async fn health_check(
        &self,
        context: RequestContext<RoleServer>,
    ) -> Result<Json<HealthCheckOutput>, McpError> {
        let identity = self.identity(&context)?;
        let handler = HealthToolHandler::new(self.broker.clone());
        handler
            .health_check(identity.as_ref())
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }
}

#[tool_handler]
impl ServerHandler for CatalogService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "catalog-mcp-server".to_owned(),
                title: Some("Catalog MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Tools for discovering database objects.\n\
                \n\
                ## Workflow\n\
                1. Call `find_objects` with a few keywords to locate relevant tables or views\n\
                2. Call `describe_object` on a hit to get its columns and foreign keys\n\
                3. Use `list_objects` to browse a kind exhaustively, optionally with `like_pattern`\n\
                \n\
                ## Notes\n\
                - Results only include objects the calling user may see\n\
                - Some kinds may be disabled by the server; asking for them returns an error\n\
                - Call `refresh_index` after schema changes to update `find_objects`\n\
                - Call `health_check` if tools report connection errors"
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::unconnected_broker;
    use crate::models::{Credentials, TrustMode};

    fn create_test_service() -> CatalogService {
        CatalogService::new(unconnected_broker(TrustMode::Local {
            credentials: Credentials::FromUrl,
        }))
    }

    #[test]
    fn test_server_info() {
        let info = create_test_service().get_info();
        assert_eq!(info.server_info.name, "catalog-mcp-server");
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn test_registers_catalog_tools() {
        let service = create_test_service();
        let mut names: Vec<String> = service
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "describe_object",
                "find_objects",
                "health_check",
                "list_objects",
                "refresh_index"
            ]
        );
    }
}
