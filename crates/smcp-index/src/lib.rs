//! # smcp-index
//!
//! Semantic search engine for smcp.
//!
//! ```text
//! (type, entity_id, text)
//!     │
//!     ├──> vector_id(type, entity_id)      deterministic two-stage SHA-256
//!     ├──> Embedder::embed(text)           unit vector[D]
//!     ├──> VectorIndex   id -> vector      <index_path>
//!     └──> VectorCatalog id -> owner       <index_path stem>.meta.json
//! ```
//!
//! [`SemanticStore`] composes the pieces and keeps index and catalog in
//! lockstep, rewriting both files after every mutation.

pub mod catalog;
pub mod embedder;
#[cfg(feature = "fastembed")]
pub mod fastembed_embedder;
pub mod index;
mod persist;
pub mod store;
pub mod vector_id;

pub use catalog::{CatalogEntry, VectorCatalog};
pub use embedder::{build_embedder, Embedder, HashEmbedder, SharedEmbedder};
#[cfg(feature = "fastembed")]
pub use fastembed_embedder::FastEmbedder;
pub use index::VectorIndex;
pub use store::{SemanticStore, StoreHealth, VectorHit};
pub use vector_id::vector_id;
