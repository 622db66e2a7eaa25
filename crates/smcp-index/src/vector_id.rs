//! Deterministic vector ids.
//!
//! Byte-exact derivation, stable across processes and implementations:
//!
//! ```text
//! ns        = SHA-256(b"smart-mcp::" ++ utf8(type))
//! digest    = SHA-256(ns ++ utf8(entity_id))
//! vector_id = u128::from_be_bytes(digest[0..16]) mod (2^63 - 1)
//! ```
//!
//! Hashing the type into its own namespace first keeps a resource and a tool
//! with the same textual id in different slots.

use sha2::{Digest, Sha256};
use smcp_core::EntityKind;

/// Prefix hashed together with the entity type to form the namespace.
pub const NAMESPACE_PREFIX: &str = "smart-mcp::";

/// Exclusive upper bound of vector ids.
pub const VECTOR_ID_MODULUS: u64 = (1 << 63) - 1;

/// Namespace digest for one entity type.
#[must_use]
pub fn namespace(kind: EntityKind) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(NAMESPACE_PREFIX.as_bytes());
    hasher.update(kind.as_str().as_bytes());
    hasher.finalize().into()
}

/// Vector id for `(kind, entity_id)`.
#[must_use]
pub fn vector_id(kind: EntityKind, entity_id: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(namespace(kind));
    hasher.update(entity_id.as_bytes());
    let digest = hasher.finalize();

    let mut head = [0_u8; 16];
    head.copy_from_slice(&digest[..16]);
    let wide = u128::from_be_bytes(head) % u128::from(VECTOR_ID_MODULUS);
    // Always < 2^63 - 1 after the reduction.
    wide as u64
}
