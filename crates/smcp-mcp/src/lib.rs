//! # smcp-mcp
//!
//! MCP (Model Context Protocol) server for smcp.
//!
//! Exposes entity CRUD and search as MCP tools:
//! - `smcp_search`: Merged semantic + keyword search
//! - `smcp_list` / `smcp_get`: Read entities
//! - `smcp_create_*` / `smcp_update_*` / `smcp_delete`: Write entities
//! - `smcp_reindex`: Rebuild the vector index from storage
//! - `smcp_status`: Entity counts and index health
//!
//! Stored resources are also served through `resources/list` and
//! `resources/read` as `resource:///<id>`, and stored prompts through
//! `prompts/list` and `prompts/get` by name.

pub mod tools;

pub use tools::{SmcpMcpService, RESOURCE_URI_PREFIX};
