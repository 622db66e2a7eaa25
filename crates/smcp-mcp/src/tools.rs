//! MCP tool definitions for smcp entity CRUD and search, plus the native
//! resources and prompts surface over the stored entities.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        AnnotateAble, GetPromptRequestParam, GetPromptResult, ListPromptsResult,
        ListResourcesResult, PaginatedRequestParam, PromptMessage, PromptMessageRole, RawResource,
        ReadResourceRequestParam, ReadResourceResult, ResourceContents, ServerCapabilities,
        ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_handler, tool_router, ErrorData, ServerHandler,
};
use serde::{Deserialize, Serialize};

use smcp_core::{
    EntityKind, PromptCreate, PromptRole, PromptUpdate, ResourceCreate, ResourceUpdate, SmcpError,
    ToolCreate, ToolUpdate,
};
use smcp_search::EntityService;

/// smcp MCP server. All tool calls go through one locked [`EntityService`].
#[derive(Clone)]
pub struct SmcpMcpService {
    service: Arc<Mutex<EntityService>>,
    tool_router: ToolRouter<Self>,
}

impl std::fmt::Debug for SmcpMcpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmcpMcpService").finish_non_exhaustive()
    }
}

impl SmcpMcpService {
    /// Wrap an opened entity service.
    pub fn new(service: EntityService) -> Self {
        Self {
            service: Arc::new(Mutex::new(service)),
            tool_router: Self::tool_router(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, EntityService>, String> {
        self.service
            .lock()
            .map_err(|_| "entity service lock poisoned".to_string())
    }
}

/// URI prefix of stored resources in `resources/list` and `resources/read`.
pub const RESOURCE_URI_PREFIX: &str = "resource:///";

const RESOURCE_MIME_TYPE: &str = "text/markdown";
const PROMPT_LIST_PREVIEW: usize = 80;
const PROMPT_GET_PREVIEW: usize = 120;

fn error_json(message: impl Display) -> String {
    let message = message.to_string();
    tracing::warn!(error = %message, "MCP tool call failed");
    serde_json::json!({ "error": message }).to_string()
}

fn internal_error(e: impl Display) -> ErrorData {
    tracing::warn!(error = %e, "MCP request failed");
    ErrorData::internal_error(e.to_string(), None)
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(error_json)
}

// === Tool request types ===

/// Request for merged semantic + keyword search.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchRequest {
    /// Free-text query
    pub query: String,
    /// Restrict to one kind: prompt, resource, or tool (default: all)
    pub target: Option<EntityKind>,
    /// Maximum results to return (default: configured top_k)
    pub limit: Option<usize>,
}

/// Request naming one entity kind.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct KindRequest {
    /// Entity kind: prompt, resource, or tool
    pub kind: EntityKind,
}

/// Request naming one entity.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct EntityRequest {
    /// Entity kind: prompt, resource, or tool
    pub kind: EntityKind,
    /// Entity id (e.g., resource_1a2b3c4d)
    pub id: String,
}

/// Partial update of a prompt. Absent fields are left unchanged.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdatePromptRequest {
    pub id: String,
    #[serde(flatten)]
    pub changes: PromptUpdate,
}

/// Partial update of a resource. Absent fields are left unchanged.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateResourceRequest {
    pub id: String,
    #[serde(flatten)]
    pub changes: ResourceUpdate,
}

/// Partial update of a tool. Absent fields are left unchanged.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateToolRequest {
    pub id: String,
    #[serde(flatten)]
    pub changes: ToolUpdate,
}

fn not_found(kind: EntityKind, id: &str) -> String {
    error_json(SmcpError::NotFound(format!("{kind} '{id}'")))
}

#[tool_router]
impl SmcpMcpService {
    /// Merged semantic and keyword search.
    #[tool(
        description = "Search prompts, resources, and tools. Resources and tools are ranked by semantic similarity; prompts by keyword match"
    )]
    fn smcp_search(&self, Parameters(req): Parameters<SearchRequest>) -> String {
        let service = match self.lock() {
            Ok(s) => s,
            Err(e) => return error_json(e),
        };
        match service.search(&req.query, req.target, req.limit) {
            Ok(hits) => to_json(&hits),
            Err(e) => error_json(format!("Search failed: {e}")),
        }
    }

    #[tool(description = "List all entities of one kind (prompt, resource, or tool)")]
    fn smcp_list(&self, Parameters(req): Parameters<KindRequest>) -> String {
        let service = match self.lock() {
            Ok(s) => s,
            Err(e) => return error_json(e),
        };
        match service.list(req.kind) {
            Ok(items) => to_json(&items),
            Err(e) => error_json(e),
        }
    }

    #[tool(description = "Read one entity by kind and id")]
    fn smcp_get(&self, Parameters(req): Parameters<EntityRequest>) -> String {
        let service = match self.lock() {
            Ok(s) => s,
            Err(e) => return error_json(e),
        };
        match service.get(req.kind, &req.id) {
            Ok(Some(item)) => to_json(&item),
            Ok(None) => not_found(req.kind, &req.id),
            Err(e) => error_json(e),
        }
    }

    #[tool(description = "Create a prompt template (system, user, or assistant role)")]
    fn smcp_create_prompt(&self, Parameters(req): Parameters<PromptCreate>) -> String {
        let mut service = match self.lock() {
            Ok(s) => s,
            Err(e) => return error_json(e),
        };
        match service.create_prompt(req) {
            Ok(p) => to_json(&p),
            Err(e) => error_json(e),
        }
    }

    #[tool(description = "Create a resource and index it for semantic search")]
    fn smcp_create_resource(&self, Parameters(req): Parameters<ResourceCreate>) -> String {
        let mut service = match self.lock() {
            Ok(s) => s,
            Err(e) => return error_json(e),
        };
        match service.create_resource(req) {
            Ok(r) => to_json(&r),
            Err(e) => error_json(e),
        }
    }

    #[tool(description = "Create a tool and index it for semantic search")]
    fn smcp_create_tool(&self, Parameters(req): Parameters<ToolCreate>) -> String {
        let mut service = match self.lock() {
            Ok(s) => s,
            Err(e) => return error_json(e),
        };
        match service.create_tool(req) {
            Ok(t) => to_json(&t),
            Err(e) => error_json(e),
        }
    }

    #[tool(description = "Update fields of an existing prompt")]
    fn smcp_update_prompt(&self, Parameters(req): Parameters<UpdatePromptRequest>) -> String {
        let mut service = match self.lock() {
            Ok(s) => s,
            Err(e) => return error_json(e),
        };
        match service.update_prompt(&req.id, req.changes) {
            Ok(Some(p)) => to_json(&p),
            Ok(None) => not_found(EntityKind::Prompt, &req.id),
            Err(e) => error_json(e),
        }
    }

    #[tool(description = "Update fields of an existing resource and re-index it")]
    fn smcp_update_resource(&self, Parameters(req): Parameters<UpdateResourceRequest>) -> String {
        let mut service = match self.lock() {
            Ok(s) => s,
            Err(e) => return error_json(e),
        };
        match service.update_resource(&req.id, req.changes) {
            Ok(Some(r)) => to_json(&r),
            Ok(None) => not_found(EntityKind::Resource, &req.id),
            Err(e) => error_json(e),
        }
    }

    #[tool(description = "Update fields of an existing tool and re-index it")]
    fn smcp_update_tool(&self, Parameters(req): Parameters<UpdateToolRequest>) -> String {
        let mut service = match self.lock() {
            Ok(s) => s,
            Err(e) => return error_json(e),
        };
        match service.update_tool(&req.id, req.changes) {
            Ok(Some(t)) => to_json(&t),
            Ok(None) => not_found(EntityKind::Tool, &req.id),
            Err(e) => error_json(e),
        }
    }

    #[tool(description = "Delete an entity by kind and id. Deleting a missing entity is not an error")]
    fn smcp_delete(&self, Parameters(req): Parameters<EntityRequest>) -> String {
        let mut service = match self.lock() {
            Ok(s) => s,
            Err(e) => return error_json(e),
        };
        match service.delete(req.kind, &req.id) {
            Ok(deleted) => to_json(&serde_json::json!({
                "type": req.kind,
                "id": req.id,
                "deleted": deleted,
            })),
            Err(e) => error_json(e),
        }
    }

    /// Rebuild the vector index from stored resources and tools.
    #[tool(
        description = "Rebuild the semantic index from all stored resources and tools. Use after index corruption or model changes"
    )]
    fn smcp_reindex(&self) -> String {
        let mut service = match self.lock() {
            Ok(s) => s,
            Err(e) => return error_json(e),
        };
        match service.reindex() {
            Ok(report) => to_json(&report),
            Err(e) => error_json(format!("Reindex failed: {e}")),
        }
    }

    #[tool(
        description = "Entity counts per kind and semantic index health (vectors, catalog entries, orphans)"
    )]
    fn smcp_status(&self) -> String {
        let service = match self.lock() {
            Ok(s) => s,
            Err(e) => return error_json(e),
        };
        match service.status() {
            Ok(status) => to_json(&status),
            Err(e) => error_json(e),
        }
    }
}

// === Native resources and prompts ===

impl SmcpMcpService {
    /// Every stored resource as `resource:///<id>`.
    fn resource_listing(&self) -> Result<Vec<rmcp::model::Resource>, ErrorData> {
        let service = self.lock().map_err(internal_error)?;
        let resources = service.database().list_resources().map_err(internal_error)?;
        Ok(resources
            .into_iter()
            .map(|r| {
                let mut raw = RawResource::new(format!("{RESOURCE_URI_PREFIX}{}", r.id), r.name);
                raw.description = Some(r.description);
                raw.mime_type = Some(RESOURCE_MIME_TYPE.to_string());
                raw.no_annotation()
            })
            .collect())
    }

    fn resource_contents(&self, uri: &str) -> Result<ResourceContents, ErrorData> {
        let id = uri.strip_prefix(RESOURCE_URI_PREFIX).ok_or_else(|| {
            ErrorData::invalid_params(format!("unsupported resource URI: {uri}"), None)
        })?;
        let service = self.lock().map_err(internal_error)?;
        let resource = service
            .database()
            .get_resource(id)
            .map_err(internal_error)?
            .ok_or_else(|| {
                tracing::warn!(uri, "resource not found");
                ErrorData::resource_not_found(format!("Resource not found: {id}"), None)
            })?;

        let mut contents = ResourceContents::text(resource.content, uri);
        if let ResourceContents::TextResourceContents { mime_type, .. } = &mut contents {
            *mime_type = Some(RESOURCE_MIME_TYPE.to_string());
        }
        Ok(contents)
    }

    fn prompt_listing(&self) -> Result<Vec<rmcp::model::Prompt>, ErrorData> {
        let service = self.lock().map_err(internal_error)?;
        let prompts = service.database().list_prompts().map_err(internal_error)?;
        Ok(prompts
            .into_iter()
            .map(|p| {
                rmcp::model::Prompt::new(
                    p.name,
                    Some(preview(&p.content, PROMPT_LIST_PREVIEW)),
                    Some(Vec::new()),
                )
            })
            .collect())
    }

    /// Look a prompt up by name. System prompts are delivered as user messages.
    fn prompt_by_name(&self, name: &str) -> Result<GetPromptResult, ErrorData> {
        let service = self.lock().map_err(internal_error)?;
        let prompt = service
            .database()
            .list_prompts()
            .map_err(internal_error)?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| {
                tracing::warn!(name, "prompt not found");
                ErrorData::invalid_params(format!("Prompt not found: {name}"), None)
            })?;

        let role = match prompt.role {
            PromptRole::System | PromptRole::User => PromptMessageRole::User,
            PromptRole::Assistant => PromptMessageRole::Assistant,
        };
        Ok(GetPromptResult {
            description: Some(preview(&prompt.content, PROMPT_GET_PREVIEW)),
            messages: vec![PromptMessage::new_text(role, prompt.content)],
        })
    }
}

#[tool_handler]
impl ServerHandler for SmcpMcpService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "smart-mcp registry server. Store prompts, resources, and tools; \
                 search them semantically; rebuild the index and check its health. \
                 Stored resources and prompts are also served as MCP resources and prompts."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_prompts()
                .enable_resources()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }

    fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListResourcesResult, ErrorData>> + Send + '_ {
        async move { self.resource_listing().map(ListResourcesResult::with_all_items) }
    }

    fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ReadResourceResult, ErrorData>> + Send + '_ {
        async move {
            let contents = self.resource_contents(&request.uri)?;
            Ok(ReadResourceResult {
                contents: vec![contents],
            })
        }
    }

    fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListPromptsResult, ErrorData>> + Send + '_ {
        async move { self.prompt_listing().map(ListPromptsResult::with_all_items) }
    }

    fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<GetPromptResult, ErrorData>> + Send + '_ {
        async move { self.prompt_by_name(&request.name) }
    }
}
