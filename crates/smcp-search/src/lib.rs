//! # smcp-search
//!
//! Search and write orchestration on top of `smcp-store` and `smcp-index`.
//!
//! - [`SearchOrchestrator`] merges semantic hits for resources and tools with
//!   the keyword fallback for prompts into one ranked list.
//! - [`EntityService`] is the single writer: it persists entities to SQLite
//!   and mirrors every resource/tool change into the semantic store.

pub mod orchestrator;
pub mod service;

pub use orchestrator::{SearchHit, SearchOrchestrator, DEFAULT_KEYWORD_SCORE};
pub use service::{EntityService, ReindexReport, ServiceStatus};
