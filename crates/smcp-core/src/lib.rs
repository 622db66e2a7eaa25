//! # smcp-core
//!
//! Core types shared by every smcp crate:
//! - Entity models ([`Prompt`], [`Resource`], [`Tool`]) and [`EntityKind`]
//! - [`EmbeddableItem`], the text handed to the embedder for one entity
//! - The [`EntityRepository`] read seam used by search
//! - Error hierarchy ([`SmcpError`], [`VectorError`])
//! - Process [`Settings`]

pub mod config;
pub mod entity;
pub mod error;
pub mod repository;

pub use self::config::{EmbeddingBackend, Settings};
pub use entity::{
    new_entity_id, EmbeddableItem, EntityKind, EntityPayload, Prompt, PromptCreate, PromptRole,
    PromptUpdate, Resource, ResourceCreate, ResourceUpdate, Tool, ToolCreate, ToolUpdate,
};
pub use error::{Result, SmcpError, VectorError};
pub use repository::{EntityRepository, HasId};
